//! In-memory registry of streaming sessions keyed by session id.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;

use sp_domain::trace::TraceEvent;

use crate::session::{ConnectionId, StreamSession};

/// Binding returned by [`SessionRegistry::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_id: String,
    pub connection: ConnectionId,
    /// Connection previously bound to this session id, if the open
    /// overwrote a live binding.
    pub replaced: Option<ConnectionId>,
}

/// Thread-safe registry of all live sessions.
///
/// Every operation takes the single registry lock; the lock is never held
/// across an await point.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, StreamSession>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Bind a fresh `idle` session to `connection`.  An existing entry for
    /// the same id is overwritten (last writer wins); the displaced
    /// connection is reported in the handle but not touched.
    pub fn open(&self, connection: ConnectionId, session_id: &str) -> SessionHandle {
        let session = StreamSession::new(session_id, connection, Utc::now());
        let replaced = self
            .sessions
            .write()
            .insert(session_id.to_owned(), session)
            .map(|prev| prev.connection);

        if let Some(prev) = replaced {
            tracing::warn!(
                session_id = %session_id,
                connection = %connection,
                replaced = %prev,
                "session id re-opened, prior binding overwritten"
            );
        }

        TraceEvent::SessionOpened {
            session_id: session_id.to_owned(),
            connection_id: connection.as_u64(),
            replaced_connection: replaced.map(ConnectionId::as_u64),
        }
        .emit();

        SessionHandle {
            session_id: session_id.to_owned(),
            connection,
            replaced,
        }
    }

    /// Remove a session regardless of which connection owns it.
    /// Unknown ids are a no-op.
    pub fn close(&self, session_id: &str) -> Option<StreamSession> {
        let removed = self.sessions.write().remove(session_id);
        if removed.is_some() {
            tracing::info!(session_id = %session_id, "session closed");
        }
        removed
    }

    /// Disconnect cleanup: remove the session only while it is still bound
    /// to `connection`, so a connection displaced by a re-open cannot tear
    /// down its successor's session.
    pub fn release(&self, session_id: &str, connection: ConnectionId) -> Option<StreamSession> {
        let removed = {
            let mut sessions = self.sessions.write();
            match sessions.get(session_id) {
                Some(s) if s.connection == connection => sessions.remove(session_id),
                _ => None,
            }
        };

        match &removed {
            Some(s) => TraceEvent::SessionReleased {
                session_id: session_id.to_owned(),
                connection_id: connection.as_u64(),
                was_streaming: s.is_streaming(),
                total_metrics: s.metrics_count,
            }
            .emit(),
            None => tracing::debug!(
                session_id = %session_id,
                connection = %connection,
                "release skipped, session not bound to this connection"
            ),
        }

        removed
    }

    /// Snapshot of a session.
    pub fn get(&self, session_id: &str) -> Option<StreamSession> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Apply `f` to the session under the registry lock, but only if the
    /// session exists and is bound to `connection`.
    pub fn update<R>(
        &self,
        session_id: &str,
        connection: ConnectionId,
        f: impl FnOnce(&mut StreamSession) -> R,
    ) -> Option<R> {
        let mut sessions = self.sessions.write();
        match sessions.get_mut(session_id) {
            Some(s) if s.connection == connection => Some(f(s)),
            _ => None,
        }
    }

    /// Snapshots of all sessions, oldest first.
    pub fn list(&self) -> Vec<StreamSession> {
        let mut all: Vec<StreamSession> = self.sessions.read().values().cloned().collect();
        all.sort_by_key(|s| s.created_at);
        all
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Sessions currently in the `streaming` state.
    pub fn streaming_count(&self) -> usize {
        self.sessions
            .read()
            .values()
            .filter(|s| s.is_streaming())
            .count()
    }
}
