//! Streaming protocol: WebSocket message types exchanged between a
//! streaming client (or dashboard) and the StreamPilot gateway.
//!
//! Every frame is a JSON object tagged by `type`.  Clients send
//! [`ClientMessage`]s scoped to the session named in the connection URL;
//! the gateway answers with [`ServerMessage`]s, either unicast to the
//! originating connection or broadcast to every connection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Client → gateway frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Begin streaming on this connection's session.
    StreamStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        platforms: Option<Vec<String>>,
    },

    /// End streaming on this connection's session.
    StreamStop,

    /// One telemetry sample.
    Metrics { data: MetricsPayload },

    /// Application-level heartbeat.
    Ping { timestamp: i64 },
}

impl ClientMessage {
    /// Decode a text frame.  Frames with a missing or unknown `type`, or a
    /// `metrics` frame without a well-formed `data` object, are errors.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// The `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StreamStart { .. } => "stream_start",
            Self::StreamStop => "stream_stop",
            Self::Metrics { .. } => "metrics",
            Self::Ping { .. } => "ping",
        }
    }
}

/// Gateway → client frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Unicast acknowledgment of `stream_start`.
    StreamStarted {
        session_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Unicast summary after `stream_stop`.
    StreamStopped {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_metrics: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_seconds: Option<f64>,
        timestamp: DateTime<Utc>,
    },

    /// Broadcast of every received metrics sample.
    MetricsUpdate {
        session_id: String,
        data: MetricsPayload,
        timestamp: DateTime<Utc>,
    },

    /// Heartbeat response.
    Pong { timestamp: i64 },
}

/// Telemetry sample as sent by the streaming client.
///
/// The client's object is kept as received, so the broadcast carries it
/// unchanged (unknown fields and integer/float spelling included).  Decoding
/// only checks that `fps`, `bitrate` and `viewers` are JSON numbers; typed
/// views are derived through the accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct MetricsPayload {
    fields: Map<String, Value>,
}

const REQUIRED_METRICS: [&str; 3] = ["fps", "bitrate", "viewers"];

/// A `metrics.data` object missing one of the required numeric fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("metrics field `{0}` must be a number")]
pub struct InvalidMetrics(&'static str);

impl TryFrom<Map<String, Value>> for MetricsPayload {
    type Error = InvalidMetrics;

    fn try_from(fields: Map<String, Value>) -> Result<Self, Self::Error> {
        for key in REQUIRED_METRICS {
            if !fields.get(key).is_some_and(Value::is_number) {
                return Err(InvalidMetrics(key));
            }
        }
        Ok(Self { fields })
    }
}

impl From<MetricsPayload> for Map<String, Value> {
    fn from(payload: MetricsPayload) -> Self {
        payload.fields
    }
}

impl MetricsPayload {
    pub fn new(fps: f64, bitrate: f64, viewers: u64) -> Self {
        let mut fields = Map::new();
        fields.insert("fps".into(), fps.into());
        fields.insert("bitrate".into(), bitrate.into());
        fields.insert("viewers".into(), viewers.into());
        Self { fields }
    }

    /// Add or replace a field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn fps(&self) -> f64 {
        self.number("fps").unwrap_or(0.0)
    }

    pub fn bitrate(&self) -> f64 {
        self.number("bitrate").unwrap_or(0.0)
    }

    /// Viewer count as a whole number: fractions round to nearest,
    /// negatives clamp to 0.
    pub fn viewers(&self) -> u64 {
        match self.fields.get("viewers") {
            Some(Value::Number(n)) => n.as_u64().unwrap_or_else(|| {
                let v = n.as_f64().unwrap_or(0.0);
                if v.is_finite() && v > 0.0 {
                    v.round() as u64
                } else {
                    0
                }
            }),
            _ => 0,
        }
    }

    pub fn cpu_usage(&self) -> Option<f64> {
        self.number("cpu_usage")
    }

    pub fn memory_usage(&self) -> Option<f64> {
        self.number("memory_usage")
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    fn number(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }
}
