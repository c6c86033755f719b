//! Record shapes written to the document store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sp_protocol::MetricsPayload;

use crate::session::{StreamStart, StreamSummary};

pub const SESSIONS_COLLECTION: &str = "stream_sessions";
pub const METRICS_COLLECTION: &str = "stream_metrics";

/// One row of `stream_sessions`, inserted on `stream_start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    pub platforms: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_active: bool,
    /// Viewer count reported by the final metrics sample.
    pub total_viewers: u64,
    pub peak_viewers: u64,
}

impl SessionRecord {
    pub fn started(session_id: &str, start: &StreamStart) -> Self {
        Self {
            id: session_id.to_owned(),
            user_id: start.user_id.clone(),
            platforms: start.platforms.clone(),
            start_time: start.started_at,
            end_time: None,
            is_active: true,
            total_viewers: 0,
            peak_viewers: 0,
        }
    }

    /// Filter selecting the row of one run of a session.  Ids can be
    /// reopened, so the run's start time is part of the key.
    pub fn filter(session_id: &str, started_at: DateTime<Utc>) -> serde_json::Value {
        serde_json::json!({ "id": session_id, "start_time": started_at })
    }
}

/// Fields overwritten on `stream_stop`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEndPatch {
    pub end_time: DateTime<Utc>,
    pub is_active: bool,
    pub total_viewers: u64,
    pub peak_viewers: u64,
}

impl From<&StreamSummary> for SessionEndPatch {
    fn from(summary: &StreamSummary) -> Self {
        Self {
            end_time: summary.stopped_at,
            is_active: false,
            total_viewers: summary.last_viewers,
            peak_viewers: summary.peak_viewers,
        }
    }
}

/// One sampled row of `stream_metrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub session_id: String,
    pub fps: f64,
    pub bitrate: f64,
    pub viewers: u64,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub timestamp: DateTime<Utc>,
}

impl MetricRecord {
    pub fn from_payload(session_id: &str, data: &MetricsPayload, timestamp: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.to_owned(),
            fps: data.fps(),
            bitrate: data.bitrate(),
            viewers: data.viewers(),
            cpu_usage: data.cpu_usage().unwrap_or(0.0),
            memory_usage: data.memory_usage().unwrap_or(0.0),
            timestamp,
        }
    }
}
