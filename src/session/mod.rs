//! Microphone session management
//!
//! `MicrophoneSession` owns the capture lifecycle:
//! - Acquiring and releasing the input stream
//! - Wiring the frequency tap and chunk recorder onto it
//! - The per-frame sampling loop that publishes frequency data
//! - Assembling recorder chunks into a clip on stop

mod config;
mod sampler;
mod session;
mod state;
mod stats;

pub use config::SessionConfig;
pub use session::{FrequencyBuffer, MicrophoneSession};
pub use state::{SessionNotice, SessionState};
pub use stats::SessionStats;
