use serde::{Deserialize, Serialize};

use super::Verdict;

/// Analysis request published to NATS
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisRequestMessage {
    pub clip_id: String,
    pub media_type: String,
    pub audio: String,     // Base64-encoded clip bytes
    pub timestamp: String, // RFC3339 timestamp
}

/// Analysis reply received from the analysis service
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisResponseMessage {
    pub clip_id: String,
    pub verdict: Option<Verdict>,
    pub confidence: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
