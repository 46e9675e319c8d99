use crate::detector::Detector;
use crate::render::WaveformRenderer;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Recording session plus analysis
    pub detector: Arc<Detector>,

    /// Canvas reused across waveform snapshots
    pub renderer: Arc<Mutex<WaveformRenderer>>,
}

impl AppState {
    pub fn new(detector: Arc<Detector>, renderer: WaveformRenderer) -> Self {
        Self {
            detector,
            renderer: Arc::new(Mutex::new(renderer)),
        }
    }
}
