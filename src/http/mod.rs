//! HTTP API server for driving the detector remotely
//!
//! - POST /permission/probe - Check microphone access
//! - POST /recording/start - Start recording
//! - POST /recording/stop - Stop recording and analyze the clip
//! - GET /status - Session and analysis state
//! - GET /result - Latest verdict with share text
//! - POST /result/reset - Clear the latest verdict
//! - GET /waveform.png - Current waveform frame
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
