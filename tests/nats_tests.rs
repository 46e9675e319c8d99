// Unit tests for NATS analysis message handling
//
// These tests cover request encoding and reply parsing without a NATS server.

use base64::Engine;
use do_not_lie::analysis::nats::{build_request, parse_response, ANALYSIS_SUBJECT};
use do_not_lie::analysis::{AnalysisRequestMessage, AnalysisResponseMessage};
use do_not_lie::{Analysis, AnalysisError, Clip, Verdict};

#[test]
fn test_request_carries_clip() {
    let clip = Clip::assemble(vec![b"abc".to_vec(), b"de".to_vec()], "audio/webm");
    let message = build_request(&clip);

    assert_eq!(message.clip_id, clip.id().to_string());
    assert_eq!(message.media_type, "audio/webm");

    let audio = base64::engine::general_purpose::STANDARD
        .decode(&message.audio)
        .unwrap();
    assert_eq!(audio, b"abcde");

    let timestamp = chrono::DateTime::parse_from_rfc3339(&message.timestamp).unwrap();
    assert_eq!(timestamp, clip.recorded_at());
}

#[test]
fn test_request_serialization() {
    let message = AnalysisRequestMessage {
        clip_id: "clip-1".to_string(),
        media_type: "audio/L16;rate=16000;channels=1".to_string(),
        audio: "AAAA".to_string(),
        timestamp: "2025-01-01T00:00:00Z".to_string(),
    };

    let json = serde_json::to_value(&message).unwrap();
    assert_eq!(json["clip_id"], "clip-1");
    assert_eq!(json["audio"], "AAAA");
    assert_eq!(json["media_type"], "audio/L16;rate=16000;channels=1");
}

#[test]
fn test_response_parsing() {
    let json = r#"{"clip_id":"clip-1","verdict":"lie","confidence":83}"#;
    let response: AnalysisResponseMessage = serde_json::from_str(json).unwrap();

    assert_eq!(
        parse_response(response),
        Ok(Analysis::new(Verdict::Lie, 83))
    );
}

#[test]
fn test_response_with_error() {
    let json = r#"{"clip_id":"clip-1","verdict":null,"confidence":null,"error":"model unavailable"}"#;
    let response: AnalysisResponseMessage = serde_json::from_str(json).unwrap();

    assert_eq!(
        parse_response(response),
        Err(AnalysisError::Remote("model unavailable".to_string()))
    );
}

#[test]
fn test_response_without_verdict() {
    let json = r#"{"clip_id":"clip-1","verdict":"truth"}"#;
    let response: AnalysisResponseMessage = serde_json::from_str(json).unwrap();

    assert!(matches!(
        parse_response(response),
        Err(AnalysisError::Remote(_))
    ));
}

#[test]
fn test_unknown_verdict_is_rejected() {
    let json = r#"{"clip_id":"clip-1","verdict":"maybe","confidence":50}"#;
    assert!(serde_json::from_str::<AnalysisResponseMessage>(json).is_err());
}

#[test]
fn test_default_subject() {
    assert_eq!(ANALYSIS_SUBJECT, "analysis.request");
}
