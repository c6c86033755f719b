//! Set of live transport connections: unicast and best-effort broadcast.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use sp_protocol::ServerMessage;
use sp_sessions::ConnectionId;
use tokio::sync::mpsc;

/// Channel feeding a connection's WebSocket writer task.
pub type ConnectionSink = mpsc::Sender<ServerMessage>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// Writer task gone or connection unknown.  The connection is dead.
    #[error("connection closed")]
    Closed,
    /// Outbound queue full; the message was dropped for this recipient.
    #[error("outbound queue full")]
    Full,
}

/// Outcome of one broadcast.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
    /// Recipients whose channel was closed; the caller tears them down.
    pub dead: Vec<ConnectionId>,
}

struct ConnectionEntry {
    session_id: String,
    sink: ConnectionSink,
}

/// Thread-safe registry of live connections.
///
/// Sends use `try_send` so neither unicast nor broadcast ever waits on a
/// slow recipient.
pub struct ConnectionSet {
    next_id: AtomicU64,
    conns: RwLock<HashMap<ConnectionId, ConnectionEntry>>,
}

impl Default for ConnectionSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionSet {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            conns: RwLock::new(HashMap::new()),
        }
    }

    /// Add a connection that was opened for `session_id`.
    pub fn register(&self, session_id: &str, sink: ConnectionSink) -> ConnectionId {
        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.conns.write().insert(
            id,
            ConnectionEntry {
                session_id: session_id.to_owned(),
                sink,
            },
        );
        tracing::debug!(connection = %id, session_id = %session_id, "connection registered");
        id
    }

    /// Remove a connection.  Returns the session id it was opened for, or
    /// `None` if it was already gone.
    pub fn unregister(&self, id: ConnectionId) -> Option<String> {
        let removed = self.conns.write().remove(&id).map(|e| e.session_id);
        if removed.is_some() {
            tracing::debug!(connection = %id, "connection unregistered");
        }
        removed
    }

    pub fn send_to(&self, id: ConnectionId, message: ServerMessage) -> Result<(), SendError> {
        let sink = self
            .conns
            .read()
            .get(&id)
            .map(|e| e.sink.clone())
            .ok_or(SendError::Closed)?;

        sink.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Send `message` to every registered connection.  A failure on one
    /// recipient never affects delivery to the others.
    pub fn broadcast(&self, message: &ServerMessage) -> BroadcastReport {
        let recipients: Vec<(ConnectionId, ConnectionSink)> = self
            .conns
            .read()
            .iter()
            .map(|(id, e)| (*id, e.sink.clone()))
            .collect();

        let mut report = BroadcastReport::default();
        for (id, sink) in recipients {
            match sink.try_send(message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(connection = %id, "outbound queue full, broadcast dropped for recipient");
                    report.dropped += 1;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => report.dead.push(id),
            }
        }
        report
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.conns.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.conns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.read().is_empty()
    }
}
