use super::state::AppState;
use crate::capture::{AudioBackendConfig, AudioBackendFactory, AudioSource};
use crate::error::{CaptureError, MicError};
use crate::session::{ControllerStatus, SessionStats, StartMode, StartOptions};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    /// "new" (default) or "addendum"
    pub mode: Option<String>,

    /// Required for addendum: the session to continue
    pub session_id: Option<String>,

    /// Known persisted chunk count for addendum (looked up when absent)
    pub chunk_count: Option<u32>,

    pub label: Option<String>,

    pub language: Option<String>,

    /// WAV file to replay instead of the microphone (testing/batch)
    pub source_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub status: String,
    pub stats: Option<SessionStats>,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub label: String,
}

#[derive(Debug, Deserialize)]
pub struct ConnectivityRequest {
    pub online: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_status(e: &CaptureError) -> StatusCode {
    match e {
        CaptureError::Mic(MicError::PermissionDenied) => StatusCode::FORBIDDEN,
        CaptureError::Mic(MicError::DeviceUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        CaptureError::SequenceViolation(_) => StatusCode::CONFLICT,
        CaptureError::StorageUnavailable(_) | CaptureError::RemoteUnreachable(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /sessions/start
/// Start a new recording session or an addendum
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> impl IntoResponse {
    let mode = match req.mode.as_deref() {
        None | Some("new") => StartMode::New,
        Some("addendum") => match req.session_id {
            Some(session_id) => StartMode::Addendum {
                session_id,
                chunk_count: req.chunk_count,
            },
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse {
                        error: "addendum requires session_id".to_string(),
                    }),
                )
                    .into_response();
            }
        },
        Some(other) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("unknown mode {}", other),
                }),
            )
                .into_response();
        }
    };

    let source = match req.source_path {
        Some(path) => AudioSource::File(PathBuf::from(path)),
        None => AudioSource::Microphone,
    };

    let backend_config = AudioBackendConfig {
        target_sample_rate: state.capture.sample_rate,
        target_channels: state.capture.channels,
        ..AudioBackendConfig::default()
    };

    let backend = match AudioBackendFactory::create(source, backend_config) {
        Ok(backend) => backend,
        Err(e) => {
            error!("Failed to create audio backend: {}", e);
            let err = CaptureError::Mic(e);
            return (
                error_status(&err),
                Json(ErrorResponse {
                    error: err.to_string(),
                }),
            )
                .into_response();
        }
    };

    let opts = StartOptions {
        mode,
        label: req.label,
        language: req.language,
    };

    match state.controller.start(opts, backend).await {
        Ok(session_id) => {
            info!("Recording started via HTTP: {}", session_id);
            (
                StatusCode::OK,
                Json(StartSessionResponse {
                    session_id,
                    status: "recording".to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to start recording: {}", e);
            (
                error_status(&e),
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// POST /sessions/pause
pub async fn pause_session(State(state): State<AppState>) -> impl IntoResponse {
    state.controller.pause().await;
    let status: ControllerStatus = state.controller.status().await;
    (StatusCode::OK, Json(status)).into_response()
}

/// POST /sessions/resume
pub async fn resume_session(State(state): State<AppState>) -> impl IntoResponse {
    state.controller.resume().await;
    let status: ControllerStatus = state.controller.status().await;
    (StatusCode::OK, Json(status)).into_response()
}

/// POST /sessions/stop
pub async fn stop_session(State(state): State<AppState>) -> impl IntoResponse {
    match state.controller.stop().await {
        Ok(stats) => {
            let status = if stats.is_some() { "stopped" } else { "idle" };
            (
                StatusCode::OK,
                Json(StopSessionResponse {
                    status: status.to_string(),
                    stats,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to stop recording: {}", e);
            (
                error_status(&e),
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// GET /sessions/status
pub async fn session_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.controller.status().await;
    (StatusCode::OK, Json(status)).into_response()
}

/// GET /sessions
/// Sessions owned by the principal, newest first (record-service passthrough)
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.record_service().list_records().await {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

/// POST /sessions/:session_id/label
pub async fn rename_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<RenameRequest>,
) -> impl IntoResponse {
    let outcome = state.controller.rename(&session_id, req.label).await;
    (
        StatusCode::OK,
        Json(serde_json::json!({ "outcome": format!("{:?}", outcome) })),
    )
        .into_response()
}

/// POST /connectivity
/// Connectivity signal from the host (a collaborator, not the core):
/// flipping online triggers a queue drain.
pub async fn set_connectivity(
    State(state): State<AppState>,
    Json(req): Json<ConnectivityRequest>,
) -> impl IntoResponse {
    state.engine.connectivity().set_online(req.online);
    (StatusCode::OK, Json(serde_json::json!({ "online": req.online }))).into_response()
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
