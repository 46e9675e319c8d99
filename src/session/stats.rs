use chrono::{DateTime, Utc};
use serde::Serialize;

use super::state::SessionState;
use crate::clip::ClipInfo;
use crate::permission::PermissionState;

/// Snapshot of a microphone session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    /// Current lifecycle state
    pub state: SessionState,

    /// Last observed microphone authorization
    pub permission: PermissionState,

    /// When the current recording started, if any
    pub started_at: Option<DateTime<Utc>>,

    /// Length of the current recording so far in seconds
    pub duration_secs: Option<f64>,

    /// Chunks accumulated in the current recording
    pub chunks_count: usize,

    /// Recordings finalized since the session was created
    pub completed_recordings: usize,

    /// Most recent capture failure, if the last attempt failed
    pub last_error: Option<String>,

    /// Most recently finalized clip
    pub last_clip: Option<ClipInfo>,
}
