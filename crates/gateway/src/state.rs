use std::sync::Arc;
use std::time::Instant;

use sp_domain::config::Config;
use sp_store::DocumentStore;

use crate::stream::StreamHub;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Session registry, connection set and persistence queue.
    pub hub: Arc<StreamHub>,
    /// Read side of the document store (status endpoints).  Writes go
    /// through the hub's persistence queue.
    pub store: Arc<dyn DocumentStore>,
    pub started_at: Instant,
}
