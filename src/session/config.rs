use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a microphone session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// FFT window of the frequency tap; the buffer holds half as many bins
    /// Default: 256 (128-element frequency buffer)
    pub fft_size: usize,

    /// Target spacing of sampling loop steps (one per display refresh)
    /// Default: 16ms (~60fps)
    pub frame_interval: Duration,

    /// Upper bound on device acquisition, including the permission prompt
    /// Default: 10 seconds
    pub open_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            frame_interval: Duration::from_millis(16),
            open_timeout: Duration::from_secs(10),
        }
    }
}

impl SessionConfig {
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }
}
