//! Aggregates over persisted session records.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::{json, Value};

use sp_sessions::SESSIONS_COLLECTION;

use super::api_error;
use crate::state::AppState;

/// Upper bound on records scanned for viewer aggregates.
const AGGREGATE_SCAN_LIMIT: usize = 10_000;

/// GET /api/analytics/sessions
pub async fn session_analytics(State(state): State<AppState>) -> Response {
    match collect(&state).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "session analytics failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn collect(state: &AppState) -> Result<Value, sp_store::StoreError> {
    let store = &state.store;
    let total_sessions = store.count(SESSIONS_COLLECTION, &json!({})).await?;
    let active_sessions = store
        .count(SESSIONS_COLLECTION, &json!({ "is_active": true }))
        .await?;

    let records = store
        .find(SESSIONS_COLLECTION, &json!({}), AGGREGATE_SCAN_LIMIT)
        .await?;
    let stats = viewer_stats(&records);

    Ok(json!({
        "total_sessions": total_sessions,
        "active_sessions": active_sessions,
        "websocket_connections": state.hub.connections().len(),
        "stats": stats,
    }))
}

fn viewer_stats(records: &[Value]) -> Value {
    if records.is_empty() {
        return json!({});
    }
    let total_viewers: u64 = records
        .iter()
        .filter_map(|r| r["total_viewers"].as_u64())
        .sum();
    let peaks: Vec<u64> = records
        .iter()
        .filter_map(|r| r["peak_viewers"].as_u64())
        .collect();
    let avg_peak = if peaks.is_empty() {
        0.0
    } else {
        peaks.iter().sum::<u64>() as f64 / peaks.len() as f64
    };
    json!({
        "total_viewers": total_viewers,
        "avg_peak_viewers": avg_peak,
    })
}
