use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

/// Minimal document-store interface.
///
/// Filters are JSON objects matched by top-level field equality (an empty
/// object or `null` matches everything).  Patches are JSON objects whose
/// fields overwrite the matching documents' fields.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name for health output.
    fn backend(&self) -> &'static str;

    async fn insert(&self, collection: &str, record: Value) -> Result<(), StoreError>;

    /// Patch every matching document.  Returns the number matched.
    async fn update(&self, collection: &str, filter: &Value, patch: Value) -> Result<u64, StoreError>;

    async fn count(&self, collection: &str, filter: &Value) -> Result<u64, StoreError>;

    /// Up to `limit` matching documents, most recently inserted first.
    async fn find(&self, collection: &str, filter: &Value, limit: usize) -> Result<Vec<Value>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Top-level field equality.
pub fn matches_filter(doc: &Value, filter: &Value) -> bool {
    match filter {
        Value::Null => true,
        Value::Object(wanted) => wanted
            .iter()
            .all(|(k, v)| doc.get(k).is_some_and(|have| have == v)),
        _ => false,
    }
}

/// Shallow merge of `patch` into `doc`.  Non-object inputs are left alone.
pub fn apply_patch(doc: &mut Value, patch: &Value) {
    if let (Value::Object(target), Value::Object(fields)) = (doc, patch) {
        for (k, v) in fields {
            target.insert(k.clone(), v.clone());
        }
    }
}

pub(crate) fn ensure_object(collection: &str, value: &Value) -> Result<(), StoreError> {
    if value.is_object() {
        Ok(())
    } else {
        Err(StoreError::NotAnObject {
            collection: collection.to_owned(),
        })
    }
}

/// Collection names double as file names in the JSONL backend.
pub(crate) fn validate_collection(name: &str) -> Result<(), StoreError> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidCollection(name.to_owned()))
    }
}
