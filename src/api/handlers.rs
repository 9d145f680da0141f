//! HTTP request handlers

use super::types::{
    BackupResponse, ErrorResponse, EventRequest, EventResponse, SessionListResponse,
    SessionResponse, SuccessResponse,
};
use super::AppState;
use crate::backup;
use crate::runtime::RegistryError;
use crate::state_machine::{ContextOverrides, Event};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Session lifecycle
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/:id", get(get_session).delete(end_session))
        .route("/api/sessions/:id/start", post(start_session))
        // User and collaborator events
        .route("/api/sessions/:id/events", post(send_event))
        // Manual backup
        .route("/api/backup", post(backup_now))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Session Lifecycle
// ============================================================

async fn list_sessions(State(state): State<AppState>) -> Json<SessionListResponse> {
    Json(SessionListResponse {
        sessions: state.registry.list(),
    })
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state.registry.get(&id).ok_or_else(|| {
        AppError::NotFound(format!("No active recruit session for conversation {id}"))
    })?;
    Ok(Json(SessionResponse { session }))
}

/// Create a session and send it START. The body, if any, holds initial
/// context overrides.
async fn start_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<SessionResponse>, AppError> {
    let overrides = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        let parsed: ContextOverrides = serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid context overrides: {e}")))?;
        Some(parsed)
    };

    state.registry.start(&id, overrides)?;
    state.registry.dispatch(&id, Event::Start)?;

    let session = state
        .registry
        .get(&id)
        .ok_or_else(|| AppError::Internal(format!("Session {id} vanished after start")))?;
    Ok(Json(SessionResponse { session }))
}

async fn end_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    if !state.registry.end(&id) {
        return Err(AppError::NotFound(format!("No active recruit session for conversation {id}")));
    }
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// Events
// ============================================================

async fn send_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<EventRequest>,
) -> Result<Json<EventResponse>, AppError> {
    let span = tracing::info_span!(
        "recruit_event",
        conv_id = %id,
        correlation_id = req.correlation_id.as_deref().unwrap_or("-"),
    );
    let outcome = span.in_scope(|| state.registry.dispatch(&id, req.event))?;

    // The session may already have finished if the event completed it
    Ok(Json(EventResponse {
        outcome,
        session: state.registry.get(&id),
    }))
}

// ============================================================
// Backup
// ============================================================

async fn backup_now(State(state): State<AppState>) -> Result<Json<BackupResponse>, AppError> {
    let outcome = backup::backup(&state.registry, state.store.as_ref())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(outcome.into()))
}

async fn get_version() -> &'static str {
    concat!("recruitd ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<RegistryError> for AppError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NoActiveSession(_) => AppError::NotFound(e.to_string()),
            RegistryError::SessionExists(_) => AppError::Conflict(e.to_string()),
            RegistryError::InvalidSnapshot(_) => AppError::BadRequest(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
