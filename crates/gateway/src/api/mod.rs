pub mod analytics;
pub mod sessions;
pub mod status;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::stream::ws;

/// Build the full router: WebSocket endpoints plus read-only status API.
pub fn router() -> Router<AppState> {
    Router::new()
        // Streaming (WebSocket)
        .route("/ws", get(ws::stream_ws_generated))
        .route("/ws/:session_id", get(ws::stream_ws))
        // Status
        .route("/api/health", get(status::health))
        .route("/api/metrics", get(status::metrics))
        // Analytics (persisted records)
        .route("/api/analytics/sessions", get(analytics::session_analytics))
        // Live sessions
        .route("/api/sessions", get(sessions::list_sessions))
        .route("/api/sessions/:session_id", get(sessions::get_session))
}

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}
