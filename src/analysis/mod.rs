//! Verdicts and the adapters that produce them
//!
//! The session hands a finalized `Clip` to an `AnalysisAdapter`, which
//! answers with a verdict and a confidence score after some latency.

pub mod messages;
pub mod nats;
pub mod simulated;

use serde::{Deserialize, Serialize};

use crate::clip::Clip;
use crate::error::AnalysisError;

pub use messages::{AnalysisRequestMessage, AnalysisResponseMessage};
pub use nats::NatsAnalyzer;
pub use simulated::SimulatedAnalyzer;

/// Outcome of an analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Truth,
    Lie,
    Neutral,
}

impl Verdict {
    /// Phrase used in share text
    pub fn describe(self) -> &'static str {
        match self {
            Verdict::Truth => "telling the truth",
            Verdict::Lie => "lying",
            Verdict::Neutral => "giving an unclear response",
        }
    }
}

/// Verdict plus confidence in percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub verdict: Verdict,
    pub confidence: u8,
}

impl Analysis {
    /// Build an analysis, clamping confidence into `0..=100`
    pub fn new(verdict: Verdict, confidence: u8) -> Self {
        Self {
            verdict,
            confidence: confidence.min(100),
        }
    }

    /// What a failed analysis is reported as
    pub fn degraded() -> Self {
        Self::new(Verdict::Neutral, 0)
    }

    pub fn share_text(&self) -> String {
        format!(
            "I just took the \"Do Not Lie\" test and was found to be {} with {}% confidence. Try it yourself!",
            self.verdict.describe(),
            self.confidence
        )
    }
}

/// Pluggable classification stage
#[async_trait::async_trait]
pub trait AnalysisAdapter: Send + Sync {
    /// Classify a finalized clip
    async fn analyze(&self, clip: &Clip) -> Result<Analysis, AnalysisError>;

    /// Get adapter name for logging
    fn name(&self) -> &str;
}
