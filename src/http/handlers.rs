use super::state::AppState;
use crate::error::VoiceError;
use crate::session::{ExternalContext, SessionStats, SessionStatus, StatusSnapshot};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::{error, info, warn};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub snapshot: StatusSnapshot,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<SessionStats>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

fn session_error(e: VoiceError) -> Response {
    match e {
        VoiceError::InvalidState { .. } => error_response(StatusCode::CONFLICT, e.to_string()),
        _ => {
            error!("Session request failed: {}", e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /assistant/start
/// Start the voice session with the current context
pub async fn start_session(State(state): State<AppState>) -> Response {
    info!("Start requested over HTTP");

    if let Err(e) = state.session.start().await {
        return session_error(e);
    }

    let snapshot = state.session.status();
    if snapshot.status == SessionStatus::Standby {
        warn!("Voice session did not come up");
        return error_response(
            StatusCode::BAD_GATEWAY,
            "Voice session failed to start; check the service logs",
        );
    }

    (
        StatusCode::OK,
        Json(ControlResponse {
            status: snapshot.label,
            message: "Voice session started".to_string(),
            stats: None,
        }),
    )
        .into_response()
}

/// POST /assistant/stop
/// Stop the voice session and release devices
pub async fn stop_session(State(state): State<AppState>) -> Response {
    info!("Stop requested over HTTP");

    match state.session.stop().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(ControlResponse {
                status: state.session.status().label,
                message: "Voice session stopped".to_string(),
                stats: Some(stats),
            }),
        )
            .into_response(),
        Err(e) => session_error(e),
    }
}

/// PUT /assistant/context
/// Replace the document context used by the next session
pub async fn set_context(
    State(state): State<AppState>,
    Json(context): Json<ExternalContext>,
) -> Response {
    info!(
        "Context update: {}",
        context.name.as_deref().unwrap_or("<unnamed>")
    );

    match state.session.set_context(context).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => session_error(e),
    }
}

/// GET /assistant/status
/// Current status snapshot plus statistics
pub async fn get_status(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        Json(StatusResponse {
            snapshot: state.session.status(),
            stats: state.session.stats(),
        }),
    )
        .into_response()
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
