use thiserror::Error;

use crate::session::SessionState;

/// Failures raised while acquiring or running the microphone capture
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// User or policy refused microphone access. Recoverable by retrying.
    #[error("microphone access denied")]
    PermissionDenied,

    /// Hardware or driver failure. Recoverable later.
    #[error("audio input device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The recorder failed mid-session; the recording is discarded.
    #[error("recorder fault: {0}")]
    RecorderFault(String),
}

/// Failures of the external analysis stage
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("no audio data to analyze")]
    EmptyClip,

    #[error("analysis timed out after {0}ms")]
    Timeout(u64),

    #[error("analysis service returned an error: {0}")]
    Remote(String),

    #[error("analysis transport failed: {0}")]
    Transport(String),
}

/// Reasons a detector refuses to begin a new recording
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("session is already {}", .0.as_str())]
    Active(SessionState),

    #[error("analysis in progress")]
    Busy,

    #[error(transparent)]
    Capture(#[from] CaptureError),
}
