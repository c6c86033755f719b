//! Process-local document store.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::document::{apply_patch, ensure_object, matches_filter, validate_collection, DocumentStore};
use crate::error::StoreError;

pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// All documents of a collection in insertion order (tests, debugging).
    pub fn snapshot(&self, collection: &str) -> Vec<Value> {
        self.collections
            .read()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, collection: &str, record: Value) -> Result<(), StoreError> {
        validate_collection(collection)?;
        ensure_object(collection, &record)?;
        self.collections
            .write()
            .entry(collection.to_owned())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn update(&self, collection: &str, filter: &Value, patch: Value) -> Result<u64, StoreError> {
        validate_collection(collection)?;
        ensure_object(collection, &patch)?;
        let mut collections = self.collections.write();
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut matched = 0;
        for doc in docs.iter_mut().filter(|d| matches_filter(d, filter)) {
            apply_patch(doc, &patch);
            matched += 1;
        }
        Ok(matched)
    }

    async fn count(&self, collection: &str, filter: &Value) -> Result<u64, StoreError> {
        validate_collection(collection)?;
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|docs| docs.iter().filter(|d| matches_filter(d, filter)).count() as u64)
            .unwrap_or(0))
    }

    async fn find(&self, collection: &str, filter: &Value, limit: usize) -> Result<Vec<Value>, StoreError> {
        validate_collection(collection)?;
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .rev()
                    .filter(|d| matches_filter(d, filter))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
