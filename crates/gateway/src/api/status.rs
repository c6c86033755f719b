//! Health and runtime metrics endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use chrono::Utc;

use crate::state::AppState;

/// GET /api/health: Store reachability plus live connection counts.
///
/// Returns 200 with `"status": "degraded"` when the store ping fails; the
/// live streaming path does not depend on the store.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let (store_status, error) = match state.store.ping().await {
        Ok(()) => ("healthy", None),
        Err(e) => {
            tracing::warn!(error = %e, "store health check failed");
            ("unhealthy", Some(e.to_string()))
        }
    };
    let status = if error.is_none() { "healthy" } else { "degraded" };

    let hub = &state.hub;
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": status,
            "timestamp": Utc::now(),
            "services": {
                "store": {
                    "backend": state.store.backend(),
                    "status": store_status,
                    "error": error,
                },
            },
            "connections": {
                "websocket": hub.connections().len(),
                "active_streams": hub.sessions().streaming_count(),
            },
        })),
    )
}

/// GET /api/metrics: Process-level counters.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let hub = &state.hub;
    Json(serde_json::json!({
        "websocket_connections": hub.connections().len(),
        "active_streams": hub.sessions().streaming_count(),
        "total_sessions": hub.sessions().len(),
        "uptime_seconds": state.started_at.elapsed().as_secs_f64(),
        "metrics_sample_interval": hub.sampling().interval(),
        "persistence": hub.persist().stats(),
    }))
}
