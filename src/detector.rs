use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::analysis::{Analysis, AnalysisAdapter};
use crate::clip::Clip;
use crate::error::{AnalysisError, StartError};
use crate::render::{Scene, WaveformRenderer};
use crate::session::{MicrophoneSession, SessionState};

/// Keeps the detector busy until dropped
///
/// Handed out by `begin_analysis()` and consumed by `complete_analysis()`.
/// Dropping it without completing clears the busy flag as well.
#[must_use = "the detector stays busy only while the ticket is alive"]
pub struct AnalysisTicket {
    busy: Arc<watch::Sender<bool>>,
}

impl Drop for AnalysisTicket {
    fn drop(&mut self) {
        self.busy.send_replace(false);
    }
}

/// Record-then-analyze flow on top of a microphone session
///
/// Publishes a busy flag while the analyzer runs and the latest verdict
/// afterwards. Analysis failures never surface as errors: they are logged
/// and reported as a Neutral verdict with zero confidence.
pub struct Detector {
    session: Arc<MicrophoneSession>,
    analyzer: Arc<dyn AnalysisAdapter>,
    timeout: Option<Duration>,
    /// Serializes start against stop-then-busy
    control: Mutex<()>,
    busy_tx: Arc<watch::Sender<bool>>,
    result_tx: watch::Sender<Option<Analysis>>,
}

impl Detector {
    pub fn new(session: Arc<MicrophoneSession>, analyzer: Arc<dyn AnalysisAdapter>) -> Self {
        let (busy_tx, _) = watch::channel(false);
        let (result_tx, _) = watch::channel(None);

        Self {
            session,
            analyzer,
            timeout: None,
            control: Mutex::new(()),
            busy_tx: Arc::new(busy_tx),
            result_tx,
        }
    }

    /// Give up on the analyzer after `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn session(&self) -> &Arc<MicrophoneSession> {
        &self.session
    }

    pub fn is_busy(&self) -> bool {
        *self.busy_tx.borrow()
    }

    pub fn result(&self) -> Option<Analysis> {
        *self.result_tx.borrow()
    }

    pub fn subscribe_busy(&self) -> watch::Receiver<bool> {
        self.busy_tx.subscribe()
    }

    pub fn subscribe_result(&self) -> watch::Receiver<Option<Analysis>> {
        self.result_tx.subscribe()
    }

    /// Clear the previous verdict and start recording
    ///
    /// Refused while the session is not idle or a verdict is still pending.
    pub async fn start(&self) -> Result<(), StartError> {
        let _control = self.control.lock().await;

        let state = self.session.state();
        if state != SessionState::Idle {
            return Err(StartError::Active(state));
        }
        if self.is_busy() {
            return Err(StartError::Busy);
        }

        self.reset();
        self.session.start().await?;
        Ok(())
    }

    /// Stop recording and mark the detector busy before anyone can restart
    ///
    /// Returns `None` when nothing was recording.
    pub async fn stop(&self) -> Option<(Clip, AnalysisTicket)> {
        let _control = self.control.lock().await;
        let clip = self.session.stop().await?;
        Some((clip, self.begin_analysis()))
    }

    /// Stop recording and analyze the clip
    ///
    /// Returns `None` when nothing was recording.
    pub async fn finish(&self) -> Option<Analysis> {
        let (clip, ticket) = self.stop().await?;
        Some(self.complete_analysis(ticket, &clip).await)
    }

    /// Raise the busy flag now; it falls when the ticket is dropped
    pub fn begin_analysis(&self) -> AnalysisTicket {
        if self.busy_tx.send_replace(true) {
            debug!("Analysis started while another one is pending");
        }
        AnalysisTicket {
            busy: Arc::clone(&self.busy_tx),
        }
    }

    /// Run the analyzer on a clip and publish the verdict
    pub async fn analyze(&self, clip: &Clip) -> Analysis {
        let ticket = self.begin_analysis();
        self.complete_analysis(ticket, clip).await
    }

    /// Analyze under a ticket from `begin_analysis()` and publish the verdict
    pub async fn complete_analysis(&self, ticket: AnalysisTicket, clip: &Clip) -> Analysis {
        info!(
            "Analyzing clip {} with {} adapter",
            clip.id(),
            self.analyzer.name()
        );

        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.analyzer.analyze(clip)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(AnalysisError::Timeout(limit.as_millis() as u64)),
            },
            None => self.analyzer.analyze(clip).await,
        };

        let analysis = match outcome {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!("Analysis of clip {} failed: {}", clip.id(), e);
                Analysis::degraded()
            }
        };

        self.result_tx.send_replace(Some(analysis));
        drop(ticket);

        info!(
            "Verdict for clip {}: {:?} ({}%)",
            clip.id(),
            analysis.verdict,
            analysis.confidence
        );
        analysis
    }

    /// Forget the last verdict
    pub fn reset(&self) {
        if self.result_tx.send_replace(None).is_some() {
            info!("Analysis result cleared");
        }
    }

    /// Share text for the current verdict
    pub fn share_text(&self) -> Option<String> {
        self.result().map(|analysis| analysis.share_text())
    }

    /// Paint the current frame from session and analysis state
    pub fn paint(&self, renderer: &mut WaveformRenderer) -> Scene {
        let buffer = self.session.frequency_snapshot();
        renderer.paint(
            buffer.as_deref(),
            self.is_busy(),
            self.result().map(|a| a.verdict),
        )
    }
}
