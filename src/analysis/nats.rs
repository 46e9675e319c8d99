use anyhow::{Context, Result};
use async_nats::Client;
use base64::Engine;
use futures::StreamExt;
use std::time::Duration;
use tracing::{info, warn};

use super::messages::{AnalysisRequestMessage, AnalysisResponseMessage};
use super::{Analysis, AnalysisAdapter};
use crate::clip::Clip;
use crate::error::AnalysisError;

/// Subject the analysis service listens on
pub const ANALYSIS_SUBJECT: &str = "analysis.request";

/// Analysis delegated to a remote service over NATS request/reply
pub struct NatsAnalyzer {
    client: Client,
    subject: String,
    timeout: Duration,
}

impl NatsAnalyzer {
    /// Connect to NATS server
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            subject: ANALYSIS_SUBJECT.to_string(),
            timeout,
        })
    }

    /// Publish requests on a different subject
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    async fn request(&self, clip: &Clip) -> Result<AnalysisResponseMessage, AnalysisError> {
        let message = build_request(clip);
        let payload = serde_json::to_vec(&message)
            .map_err(|e| AnalysisError::Transport(format!("encode request: {}", e)))?;

        let inbox = self.client.new_inbox();
        let mut replies = self
            .client
            .subscribe(inbox.clone())
            .await
            .map_err(|e| AnalysisError::Transport(format!("subscribe to {}: {}", inbox, e)))?;

        self.client
            .publish_with_reply(self.subject.clone(), inbox, payload.into())
            .await
            .map_err(|e| AnalysisError::Transport(format!("publish request: {}", e)))?;

        info!(
            "Published analysis request to {} (clip={}, bytes={})",
            self.subject,
            clip.id(),
            clip.len()
        );

        let reply = match tokio::time::timeout(self.timeout, replies.next()).await {
            Ok(Some(reply)) => reply,
            Ok(None) => {
                return Err(AnalysisError::Transport(
                    "reply subscription closed".to_string(),
                ))
            }
            Err(_) => return Err(AnalysisError::Timeout(self.timeout.as_millis() as u64)),
        };

        serde_json::from_slice(&reply.payload)
            .map_err(|e| AnalysisError::Remote(format!("malformed reply: {}", e)))
    }
}

#[async_trait::async_trait]
impl AnalysisAdapter for NatsAnalyzer {
    async fn analyze(&self, clip: &Clip) -> Result<Analysis, AnalysisError> {
        if clip.is_empty() {
            return Err(AnalysisError::EmptyClip);
        }

        let response = self.request(clip).await?;
        let analysis = parse_response(response)?;

        info!(
            "Analysis for clip {}: {:?} ({}%)",
            clip.id(),
            analysis.verdict,
            analysis.confidence
        );
        Ok(analysis)
    }

    fn name(&self) -> &str {
        "nats"
    }
}

/// Encode a clip as an analysis request
pub fn build_request(clip: &Clip) -> AnalysisRequestMessage {
    AnalysisRequestMessage {
        clip_id: clip.id().to_string(),
        media_type: clip.media_type().to_string(),
        audio: base64::engine::general_purpose::STANDARD.encode(clip.bytes()),
        timestamp: clip.recorded_at().to_rfc3339(),
    }
}

/// Turn a service reply into an analysis
pub fn parse_response(response: AnalysisResponseMessage) -> Result<Analysis, AnalysisError> {
    if let Some(error) = response.error {
        warn!("Analysis service error for clip {}: {}", response.clip_id, error);
        return Err(AnalysisError::Remote(error));
    }

    match (response.verdict, response.confidence) {
        (Some(verdict), Some(confidence)) => Ok(Analysis::new(verdict, confidence)),
        _ => Err(AnalysisError::Remote(format!(
            "reply for clip {} carries no verdict",
            response.clip_id
        ))),
    }
}
