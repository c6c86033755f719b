use serde::Serialize;

/// Structured trace events emitted across all StreamPilot crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionOpened {
        session_id: String,
        connection_id: u64,
        replaced_connection: Option<u64>,
    },
    SessionReleased {
        session_id: String,
        connection_id: u64,
        was_streaming: bool,
        total_metrics: u64,
    },
    StreamStarted {
        session_id: String,
        user_id: String,
        platforms: Vec<String>,
    },
    StreamStopped {
        session_id: String,
        total_metrics: u64,
        duration_seconds: f64,
        peak_viewers: u64,
    },
    MetricsSampled {
        session_id: String,
        sequence: u64,
    },
    ConnectionDropped {
        connection_id: u64,
        reason: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "sp_event");
    }
}
