pub mod analysis;
pub mod audio;
pub mod clip;
pub mod config;
pub mod detector;
pub mod error;
pub mod http;
pub mod permission;
pub mod render;
pub mod session;

pub use analysis::{Analysis, AnalysisAdapter, NatsAnalyzer, SimulatedAnalyzer, Verdict};
pub use audio::{
    AudioBackendConfig, AudioBackendFactory, AudioDevice, AudioFile, AudioSource, ChunkRecorder,
    FrequencyTap, InputStream, ScriptedDevice,
};
pub use clip::{Clip, ClipInfo};
pub use config::Config;
pub use detector::{AnalysisTicket, Detector};
pub use error::{AnalysisError, CaptureError, StartError};
pub use http::{create_router, AppState};
pub use permission::{PermissionGate, PermissionState};
pub use render::WaveformRenderer;
pub use session::{MicrophoneSession, SessionConfig, SessionNotice, SessionState, SessionStats};
