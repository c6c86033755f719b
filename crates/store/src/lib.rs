//! Document store used by StreamPilot to persist session and metrics
//! records.
//!
//! The gateway only ever talks to [`DocumentStore`]; the concrete backend
//! is picked from `[store]` config by [`create_store`].

pub mod document;
pub mod error;
pub mod jsonl;
pub mod memory;

use std::sync::Arc;

use sp_domain::config::{StoreBackend, StoreConfig};

pub use document::{apply_patch, matches_filter, DocumentStore};
pub use error::StoreError;
pub use jsonl::JsonlStore;
pub use memory::MemoryStore;

/// Build the store backend selected by configuration.
pub async fn create_store(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Jsonl => Ok(Arc::new(JsonlStore::open(&config.path).await?)),
    }
}
