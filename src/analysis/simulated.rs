use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use super::{Analysis, AnalysisAdapter, Verdict};
use crate::clip::Clip;
use crate::error::AnalysisError;

/// Random classifier standing in for real voice-stress analysis
///
/// Draws `< 0.4` give Truth, `< 0.8` give Lie, anything else Neutral.
/// Truth and Lie carry 70-99% confidence, Neutral 40-59%.
pub struct SimulatedAnalyzer {
    latency: Duration,
    rng: Mutex<StdRng>,
}

impl SimulatedAnalyzer {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic analyzer for reproducible runs
    pub fn seeded(latency: Duration, seed: u64) -> Self {
        Self {
            latency,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn draw(&self) -> Analysis {
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let roll: f64 = rng.gen();
        if roll < 0.4 {
            Analysis::new(Verdict::Truth, rng.gen_range(70..100))
        } else if roll < 0.8 {
            Analysis::new(Verdict::Lie, rng.gen_range(70..100))
        } else {
            Analysis::new(Verdict::Neutral, rng.gen_range(40..60))
        }
    }
}

impl Default for SimulatedAnalyzer {
    fn default() -> Self {
        Self::new(Duration::from_millis(3000))
    }
}

#[async_trait::async_trait]
impl AnalysisAdapter for SimulatedAnalyzer {
    async fn analyze(&self, clip: &Clip) -> Result<Analysis, AnalysisError> {
        if clip.is_empty() {
            return Err(AnalysisError::EmptyClip);
        }

        info!("Analyzing clip {} ({} bytes)", clip.id(), clip.len());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let analysis = self.draw();
        debug!(
            "Simulated verdict for {}: {:?} ({}%)",
            clip.id(),
            analysis.verdict,
            analysis.confidence
        );
        Ok(analysis)
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
