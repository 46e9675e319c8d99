use serde::Serialize;

use crate::clip::ClipInfo;
use crate::error::CaptureError;

/// Lifecycle of a microphone session
///
/// `Idle → Initializing → Recording → Finalizing → Idle`. `Initializing`
/// falls back to `Idle` on acquisition failure; teardown or a recorder fault
/// moves `Recording` straight to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Initializing,
    Recording,
    Finalizing,
}

impl SessionState {
    pub fn is_recording(self) -> bool {
        self == SessionState::Recording
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Initializing => "initializing",
            SessionState::Recording => "recording",
            SessionState::Finalizing => "finalizing",
        }
    }
}

/// One-shot, user-facing notifications emitted by the session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionNotice {
    RecordingStarted,
    RecordingFinished { clip: ClipInfo },
    PermissionDenied,
    DeviceUnavailable { reason: String },
    RecorderFault { reason: String },
}

impl SessionNotice {
    pub fn from_error(error: &CaptureError) -> Self {
        match error {
            CaptureError::PermissionDenied => SessionNotice::PermissionDenied,
            CaptureError::DeviceUnavailable(reason) => SessionNotice::DeviceUnavailable {
                reason: reason.clone(),
            },
            CaptureError::RecorderFault(reason) => SessionNotice::RecorderFault {
                reason: reason.clone(),
            },
        }
    }

    /// Text suitable for a toast
    pub fn message(&self) -> String {
        match self {
            SessionNotice::RecordingStarted => "Recording started".to_string(),
            SessionNotice::RecordingFinished { clip } => {
                format!("Recording finished ({} bytes)", clip.size_bytes)
            }
            SessionNotice::PermissionDenied => "Microphone access is required".to_string(),
            SessionNotice::DeviceUnavailable { reason } => {
                format!("Failed to start recording: {}", reason)
            }
            SessionNotice::RecorderFault { reason } => {
                format!("Recording interrupted: {}", reason)
            }
        }
    }
}
