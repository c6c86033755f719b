//! Per-session lifecycle: `idle → streaming → stopped`.
//!
//! Transitions are pure state changes with the clock passed in; the hub in
//! the gateway performs the side effects (acknowledgments, persistence).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Identifiers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Identifies one live transport connection.  Assigned by the connection
/// set; unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    /// Connected, no `stream_start` yet.
    Idle,
    Streaming,
    /// Terminal until the session id is re-opened by a new connection.
    Stopped,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Streaming => "streaming",
            Self::Stopped => "stopped",
        })
    }
}

/// An event arrived that the current state does not accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{event} not accepted while {state}")]
pub struct TransitionError {
    pub event: &'static str,
    pub state: StreamState,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A streaming session bound to one live connection.
#[derive(Debug, Clone, Serialize)]
pub struct StreamSession {
    pub session_id: String,
    pub connection: ConnectionId,
    pub created_at: DateTime<Utc>,
    pub state: StreamState,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub platforms: Vec<String>,
    /// Metrics events accepted while streaming.
    pub metrics_count: u64,
    pub peak_viewers: u64,
    pub last_viewers: u64,
    pub is_active: bool,
}

/// Result of `idle → streaming`.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamStart {
    pub started_at: DateTime<Utc>,
    pub user_id: String,
    pub platforms: Vec<String>,
}

/// Result of `streaming → stopped`.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSummary {
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub total_metrics: u64,
    pub peak_viewers: u64,
    pub last_viewers: u64,
}

impl StreamSession {
    pub fn new(session_id: impl Into<String>, connection: ConnectionId, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            connection,
            created_at: now,
            state: StreamState::Idle,
            started_at: None,
            stopped_at: None,
            user_id: None,
            platforms: Vec::new(),
            metrics_count: 0,
            peak_viewers: 0,
            last_viewers: 0,
            is_active: true,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.state == StreamState::Streaming
    }

    /// `idle → streaming`.
    pub fn start(
        &mut self,
        user_id: String,
        platforms: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<StreamStart, TransitionError> {
        if self.state != StreamState::Idle {
            return Err(TransitionError {
                event: "stream_start",
                state: self.state,
            });
        }

        self.state = StreamState::Streaming;
        self.started_at = Some(now);
        self.user_id = Some(user_id.clone());
        self.platforms = platforms.clone();

        Ok(StreamStart {
            started_at: now,
            user_id,
            platforms,
        })
    }

    /// `streaming → stopped`.  Duration is clamped at zero if the wall
    /// clock stepped backwards between start and stop.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Result<StreamSummary, TransitionError> {
        let started_at = match (self.state, self.started_at) {
            (StreamState::Streaming, Some(t)) => t,
            _ => {
                return Err(TransitionError {
                    event: "stream_stop",
                    state: self.state,
                })
            }
        };

        self.state = StreamState::Stopped;
        self.stopped_at = Some(now);
        self.is_active = false;

        let millis = now.signed_duration_since(started_at).num_milliseconds().max(0);

        Ok(StreamSummary {
            started_at,
            stopped_at: now,
            duration_seconds: millis as f64 / 1000.0,
            total_metrics: self.metrics_count,
            peak_viewers: self.peak_viewers,
            last_viewers: self.last_viewers,
        })
    }

    /// Count one metrics event.  Returns the new counter value, which is
    /// the event's 1-based sequence number within the session.
    pub fn record_metric(&mut self, viewers: u64) -> Result<u64, TransitionError> {
        if self.state != StreamState::Streaming {
            return Err(TransitionError {
                event: "metrics",
                state: self.state,
            });
        }

        self.metrics_count += 1;
        self.last_viewers = viewers;
        self.peak_viewers = self.peak_viewers.max(viewers);
        Ok(self.metrics_count)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
