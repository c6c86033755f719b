//! Fire-and-forget persistence.
//!
//! The stream hub never awaits the store: it pushes [`PersistOp`]s into a
//! bounded queue with `try_send`, and a background writer task applies them
//! one by one.  Store failures are logged and dropped, never retried.  A
//! full queue drops the operation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use sp_store::DocumentStore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One store write.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistOp {
    Insert {
        collection: &'static str,
        record: Value,
    },
    Update {
        collection: &'static str,
        filter: Value,
        patch: Value,
    },
}

/// Counters shared by the handle and the writer.
#[derive(Debug, Default)]
pub struct PersistStats {
    submitted: AtomicU64,
    dropped: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PersistStatsSnapshot {
    pub submitted: u64,
    pub dropped: u64,
    pub written: u64,
    pub failed: u64,
}

impl PersistStats {
    pub fn snapshot(&self) -> PersistStatsSnapshot {
        PersistStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Sending half of the persistence queue.
#[derive(Clone)]
pub struct PersistHandle {
    tx: mpsc::Sender<PersistOp>,
    stats: Arc<PersistStats>,
}

impl PersistHandle {
    /// Create a handle and the receiver the writer task consumes.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PersistOp>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                stats: Arc::new(PersistStats::default()),
            },
            rx,
        )
    }

    pub fn stats(&self) -> PersistStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn insert<T: Serialize>(&self, collection: &'static str, record: &T) {
        match serde_json::to_value(record) {
            Ok(record) => self.submit(PersistOp::Insert { collection, record }),
            Err(e) => {
                tracing::error!(collection, error = %e, "failed to encode record, dropped");
            }
        }
    }

    pub fn update<T: Serialize>(&self, collection: &'static str, filter: Value, patch: &T) {
        match serde_json::to_value(patch) {
            Ok(patch) => self.submit(PersistOp::Update {
                collection,
                filter,
                patch,
            }),
            Err(e) => {
                tracing::error!(collection, error = %e, "failed to encode patch, dropped");
            }
        }
    }

    fn submit(&self, op: PersistOp) {
        match self.tx.try_send(op) {
            Ok(()) => {
                self.stats.submitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(op)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(op = ?op_kind(&op), "persist queue full, write dropped");
            }
            Err(mpsc::error::TrySendError::Closed(op)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(op = ?op_kind(&op), "persist writer stopped, write dropped");
            }
        }
    }
}

fn op_kind(op: &PersistOp) -> (&'static str, &'static str) {
    match op {
        PersistOp::Insert { collection, .. } => ("insert", collection),
        PersistOp::Update { collection, .. } => ("update", collection),
    }
}

/// Join handle of the background writer.
pub struct PersistWriter {
    join: JoinHandle<()>,
}

impl PersistWriter {
    /// Spawn the writer.  It runs until every [`PersistHandle`] is dropped
    /// and the queue is drained.
    pub fn spawn(
        store: Arc<dyn DocumentStore>,
        handle: &PersistHandle,
        rx: mpsc::Receiver<PersistOp>,
    ) -> Self {
        let stats = handle.stats.clone();
        Self {
            join: tokio::spawn(run_writer(store, rx, stats)),
        }
    }

    /// Wait for the queue to drain.  Returns `false` on timeout, in which
    /// case the remaining writes are abandoned.
    pub async fn drain(self, timeout: Duration) -> bool {
        let abort = self.join.abort_handle();
        match tokio::time::timeout(timeout, self.join).await {
            Ok(_) => true,
            Err(_) => {
                abort.abort();
                false
            }
        }
    }
}

async fn run_writer(
    store: Arc<dyn DocumentStore>,
    mut rx: mpsc::Receiver<PersistOp>,
    stats: Arc<PersistStats>,
) {
    tracing::info!(backend = store.backend(), "persist writer started");

    while let Some(op) = rx.recv().await {
        let kind = op_kind(&op);
        let result = match op {
            PersistOp::Insert { collection, record } => store.insert(collection, record).await,
            PersistOp::Update {
                collection,
                filter,
                patch,
            } => store
                .update(collection, &filter, patch)
                .await
                .map(|matched| {
                    if matched == 0 {
                        tracing::debug!(collection, "update matched no documents");
                    }
                }),
        };

        match result {
            Ok(()) => {
                stats.written.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(op = ?kind, error = %e, "persist failed, write dropped");
            }
        }
    }

    tracing::info!("persist writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sp_store::MemoryStore;

    #[tokio::test]
    async fn writer_applies_ops_in_order_and_drains() {
        let store = Arc::new(MemoryStore::new());
        let (handle, rx) = PersistHandle::channel(16);
        let writer = PersistWriter::spawn(store.clone(), &handle, rx);

        handle.insert("stream_sessions", &json!({"id": "s1", "is_active": true}));
        handle.update("stream_sessions", json!({"id": "s1"}), &json!({"is_active": false}));
        let stats = handle.stats.clone();
        drop(handle);

        assert!(writer.drain(Duration::from_secs(5)).await);
        assert_eq!(store.snapshot("stream_sessions"), vec![json!({"id": "s1", "is_active": false})]);
        let snap = stats.snapshot();
        assert_eq!(snap.submitted, 2);
        assert_eq!(snap.written, 2);
        assert_eq!(snap.failed, 0);
    }

    #[tokio::test]
    async fn store_errors_are_counted_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        let (handle, rx) = PersistHandle::channel(16);
        let writer = PersistWriter::spawn(store.clone(), &handle, rx);

        // Arrays are rejected by the store; the writer keeps going.
        handle.insert("stream_metrics", &json!([1, 2, 3]));
        handle.insert("stream_metrics", &json!({"session_id": "s1"}));
        let stats = handle.stats.clone();
        drop(handle);

        assert!(writer.drain(Duration::from_secs(5)).await);
        assert_eq!(store.snapshot("stream_metrics").len(), 1);
        assert_eq!(stats.snapshot().failed, 1);
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let (handle, mut rx) = PersistHandle::channel(1);
        handle.insert("stream_metrics", &json!({"n": 1}));
        handle.insert("stream_metrics", &json!({"n": 2}));

        let snap = handle.stats();
        assert_eq!(snap.submitted, 1);
        assert_eq!(snap.dropped, 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            PersistOp::Insert {
                collection: "stream_metrics",
                record: json!({"n": 1}),
            }
        );
    }
}
