use super::state::AppState;
use crate::analysis::Analysis;
use crate::clip::ClipInfo;
use crate::error::{CaptureError, StartError};
use crate::permission::PermissionState;
use crate::session::{SessionNotice, SessionState, SessionStats};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct PermissionResponse {
    pub permission: PermissionState,
}

#[derive(Debug, Serialize)]
pub struct StartRecordingResponse {
    pub state: SessionState,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopRecordingResponse {
    pub state: SessionState,
    pub clip: ClipInfo,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub session: SessionStats,
    pub analyzing: bool,
    pub result: Option<Analysis>,
}

#[derive(Debug, Serialize)]
pub struct ResultResponse {
    pub analyzing: bool,
    pub result: Option<Analysis>,
    pub share_text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct WaveformQuery {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

fn result_response(state: &AppState) -> ResultResponse {
    ResultResponse {
        analyzing: state.detector.is_busy(),
        result: state.detector.result(),
        share_text: state.detector.share_text(),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /permission/probe
/// Ask for microphone access without recording
pub async fn probe_permission(State(state): State<AppState>) -> impl IntoResponse {
    let permission = state.detector.session().probe_permission().await;
    info!("Permission probe: {:?}", permission);
    Json(PermissionResponse { permission })
}

/// POST /recording/start
/// Clear the last verdict and start recording
pub async fn start_recording(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.detector.session();

    match state.detector.start().await {
        Ok(()) => {
            info!("Recording started via HTTP");
            (
                StatusCode::OK,
                Json(StartRecordingResponse {
                    state: session.state(),
                    message: SessionNotice::RecordingStarted.message(),
                }),
            )
                .into_response()
        }
        Err(StartError::Active(current)) => error_response(
            StatusCode::CONFLICT,
            format!("Session is already {}", current.as_str()),
        ),
        Err(StartError::Busy) => error_response(StatusCode::CONFLICT, "Analysis in progress"),
        Err(StartError::Capture(e)) => {
            error!("Failed to start recording: {}", e);
            let status = match e {
                CaptureError::PermissionDenied => StatusCode::FORBIDDEN,
                CaptureError::DeviceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                CaptureError::RecorderFault(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            error_response(status, SessionNotice::from_error(&e).message())
        }
    }
}

/// POST /recording/stop
/// Finalize the clip and analyze it in the background
pub async fn stop_recording(State(state): State<AppState>) -> impl IntoResponse {
    let Some((clip, ticket)) = state.detector.stop().await else {
        warn!("Stop requested while not recording");
        return error_response(StatusCode::CONFLICT, "Not recording");
    };

    info!("Recording stopped via HTTP, clip {}", clip.id());

    let info = clip.info();
    let detector = Arc::clone(&state.detector);
    tokio::spawn(async move {
        detector.complete_analysis(ticket, &clip).await;
    });

    (
        StatusCode::ACCEPTED,
        Json(StopRecordingResponse {
            state: state.detector.session().state(),
            message: SessionNotice::RecordingFinished { clip: info.clone() }.message(),
            clip: info,
        }),
    )
        .into_response()
}

/// GET /status
/// Session statistics and analysis state
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.detector.session().stats().await;
    Json(StatusResponse {
        session,
        analyzing: state.detector.is_busy(),
        result: state.detector.result(),
    })
}

/// GET /result
/// Latest verdict and its share text
pub async fn get_result(State(state): State<AppState>) -> impl IntoResponse {
    Json(result_response(&state))
}

/// POST /result/reset
/// Forget the latest verdict
pub async fn reset_result(State(state): State<AppState>) -> impl IntoResponse {
    state.detector.reset();
    Json(result_response(&state))
}

/// GET /waveform.png
/// Current waveform frame as PNG
pub async fn get_waveform(
    State(state): State<AppState>,
    Query(query): Query<WaveformQuery>,
) -> impl IntoResponse {
    let mut renderer = state.renderer.lock().await;

    let width = query.width.unwrap_or(renderer.width());
    let height = query.height.unwrap_or(renderer.height());
    if let Err(e) = renderer.resize(width, height) {
        return error_response(StatusCode::BAD_REQUEST, e.to_string());
    }

    state.detector.paint(&mut renderer);

    match renderer.encode_png() {
        Ok(png) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
        Err(e) => {
            error!("Failed to encode waveform: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
