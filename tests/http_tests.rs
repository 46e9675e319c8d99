// Integration tests for the HTTP API
//
// Requests go straight into the router via tower's `oneshot`, no socket.

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use do_not_lie::audio::ScriptedDevice;
use do_not_lie::{
    create_router, AppState, CaptureError, Detector, MicrophoneSession, SessionConfig,
    SimulatedAnalyzer, WaveformRenderer,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn app(device: ScriptedDevice) -> Result<Router> {
    app_with_latency(device, Duration::ZERO)
}

fn app_with_latency(device: ScriptedDevice, latency: Duration) -> Result<Router> {
    let session = MicrophoneSession::new(
        Arc::new(device),
        SessionConfig {
            frame_interval: Duration::from_millis(5),
            ..Default::default()
        },
    );
    let analyzer = SimulatedAnalyzer::seeded(latency, 5);
    let detector = Arc::new(Detector::new(Arc::new(session), Arc::new(analyzer)));
    let renderer = WaveformRenderer::new(320, 80)?;

    Ok(create_router(AppState::new(detector, renderer)))
}

async fn send(app: &Router, method: &str, uri: &str) -> Result<(StatusCode, Vec<u8>)> {
    let response = app
        .clone()
        .oneshot(Request::builder().method(method).uri(uri).body(Body::empty())?)
        .await?;
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, body.to_vec()))
}

async fn send_json(app: &Router, method: &str, uri: &str) -> Result<(StatusCode, Value)> {
    let (status, body) = send(app, method, uri).await?;
    Ok((status, serde_json::from_slice(&body)?))
}

#[tokio::test]
async fn test_health() -> Result<()> {
    let app = app(ScriptedDevice::new())?;

    let (status, body) = send(&app, "GET", "/health").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");

    Ok(())
}

#[tokio::test]
async fn test_record_and_analyze() -> Result<()> {
    let device = ScriptedDevice::new().with_chunks(vec![b"abc".to_vec(), b"de".to_vec()]);
    let app = app(device)?;

    let (status, body) = send_json(&app, "POST", "/recording/start").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "recording");
    assert_eq!(body["message"], "Recording started");

    let (status, _) = send_json(&app, "POST", "/recording/start").await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send_json(&app, "GET", "/status").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["state"], "recording");
    assert_eq!(body["session"]["permission"], "granted");

    let (status, body) = send_json(&app, "POST", "/recording/stop").await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["state"], "idle");
    assert_eq!(body["clip"]["size_bytes"], 5);
    assert_eq!(body["clip"]["media_type"], "audio/webm");

    // Analysis runs in the background
    let mut result = Value::Null;
    for _ in 0..100 {
        let (_, body) = send_json(&app, "GET", "/result").await?;
        if !body["result"].is_null() {
            result = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(result["analyzing"], false);
    let verdict = result["result"]["verdict"].as_str().unwrap_or_default();
    assert!(["truth", "lie", "neutral"].contains(&verdict));
    assert!(result["share_text"]
        .as_str()
        .unwrap_or_default()
        .starts_with("I just took the \"Do Not Lie\" test"));

    let (status, body) = send_json(&app, "POST", "/result/reset").await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["result"].is_null());
    assert!(body["share_text"].is_null());

    Ok(())
}

#[tokio::test]
async fn test_restart_refused_until_verdict() -> Result<()> {
    let device = ScriptedDevice::new().with_chunks(vec![b"voice".to_vec()]);
    let app = app_with_latency(device, Duration::from_millis(200))?;

    let (status, _) = send_json(&app, "POST", "/recording/start").await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send_json(&app, "POST", "/recording/stop").await?;
    assert_eq!(status, StatusCode::ACCEPTED);

    // Busy from the moment stop returns
    let (status, body) = send_json(&app, "POST", "/recording/start").await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Analysis in progress");

    let (_, body) = send_json(&app, "GET", "/result").await?;
    assert_eq!(body["analyzing"], true);
    assert!(body["result"].is_null());

    let mut analyzing = true;
    for _ in 0..100 {
        let (_, body) = send_json(&app, "GET", "/result").await?;
        if body["analyzing"] == false {
            assert!(!body["result"].is_null());
            analyzing = false;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!analyzing, "analysis never finished");

    // The new recording starts with no verdict
    let (status, _) = send_json(&app, "POST", "/recording/start").await?;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = send_json(&app, "GET", "/result").await?;
    assert!(body["result"].is_null());

    Ok(())
}

#[tokio::test]
async fn test_stop_when_idle_conflicts() -> Result<()> {
    let app = app(ScriptedDevice::new())?;

    let (status, body) = send_json(&app, "POST", "/recording/stop").await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Not recording");

    Ok(())
}

#[tokio::test]
async fn test_permission_denied() -> Result<()> {
    let app = app(ScriptedDevice::new().failing_with(CaptureError::PermissionDenied))?;

    let (status, body) = send_json(&app, "POST", "/recording/start").await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Microphone access is required");

    let (_, body) = send_json(&app, "GET", "/status").await?;
    assert_eq!(body["session"]["state"], "idle");
    assert_eq!(body["session"]["permission"], "denied");

    let (status, body) = send_json(&app, "POST", "/permission/probe").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["permission"], "denied");

    Ok(())
}

#[tokio::test]
async fn test_device_unavailable() -> Result<()> {
    let app = app(
        ScriptedDevice::new().failing_with(CaptureError::DeviceUnavailable("no input".to_string())),
    )?;

    let (status, body) = send_json(&app, "POST", "/recording/start").await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Failed to start recording: no input");

    Ok(())
}

#[tokio::test]
async fn test_permission_probe() -> Result<()> {
    let app = app(ScriptedDevice::new())?;

    let (status, body) = send_json(&app, "POST", "/permission/probe").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["permission"], "granted");

    Ok(())
}

#[tokio::test]
async fn test_waveform_png() -> Result<()> {
    let app = app(ScriptedDevice::new())?;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/waveform.png?width=100&height=50")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    assert_eq!(&body[1..4], b"PNG");

    let (status, _) = send(&app, "GET", "/waveform.png").await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "GET", "/waveform.png?width=0").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}
