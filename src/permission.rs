use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{info, warn};

use crate::audio::AudioDevice;
use crate::error::CaptureError;

/// Microphone authorization as last observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Unknown,
    Granted,
    Denied,
}

/// Requests and tracks microphone authorization
///
/// Once a decision has been observed the gate never goes back to `Unknown`.
pub struct PermissionGate {
    device: Arc<dyn AudioDevice>,
    state: Mutex<PermissionState>,
    timeout: Duration,
}

impl PermissionGate {
    pub fn new(device: Arc<dyn AudioDevice>, timeout: Duration) -> Self {
        Self {
            device,
            state: Mutex::new(PermissionState::Unknown),
            timeout,
        }
    }

    pub fn state(&self) -> PermissionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask for microphone access without keeping the device open
    ///
    /// Any failure, including a prompt that never resolves within the
    /// timeout, is reported as `Denied`.
    pub async fn probe(&self) -> PermissionState {
        info!("Probing microphone permission via {}", self.device.name());

        let state = match tokio::time::timeout(self.timeout, self.device.open()).await {
            Ok(Ok(mut stream)) => {
                stream.close();
                PermissionState::Granted
            }
            Ok(Err(e)) => {
                warn!("Microphone probe failed: {}", e);
                PermissionState::Denied
            }
            Err(_) => {
                warn!("Microphone probe timed out after {:?}", self.timeout);
                PermissionState::Denied
            }
        };

        self.set(state);
        state
    }

    /// Record the outcome of a real acquisition attempt
    pub(crate) fn record(&self, outcome: Result<(), &CaptureError>) {
        let state = match outcome {
            Ok(()) => PermissionState::Granted,
            Err(_) => PermissionState::Denied,
        };
        self.set(state);
    }

    fn set(&self, state: PermissionState) {
        let mut current = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != state {
            info!("Microphone permission: {:?} -> {:?}", *current, state);
        }
        *current = state;
    }
}
