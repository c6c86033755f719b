//! Live session endpoints (registry snapshots, not persisted records).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use super::api_error;
use crate::state::AppState;

/// GET /api/sessions: Every session bound to a live connection.
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.hub.sessions().list();
    Json(serde_json::json!({
        "sessions": sessions,
        "count": sessions.len(),
    }))
}

/// GET /api/sessions/:session_id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    match state.hub.sessions().get(&session_id) {
        Some(session) => Json(session).into_response(),
        None => api_error(StatusCode::NOT_FOUND, format!("session not found: {session_id}")),
    }
}
