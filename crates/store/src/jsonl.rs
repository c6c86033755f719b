//! JSONL-file document store.
//!
//! Each collection lives in `<root>/<collection>.jsonl`, one document per
//! line.  The whole store is mirrored in memory; inserts append a line,
//! updates rewrite the collection file through a temp file + rename.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::document::{apply_patch, ensure_object, matches_filter, validate_collection, DocumentStore};
use crate::error::StoreError;

pub struct JsonlStore {
    root: PathBuf,
    collections: Mutex<HashMap<String, Vec<Value>>>,
}

impl JsonlStore {
    /// Open (creating if needed) the store directory and load every
    /// `*.jsonl` file in it.  Unparseable lines are skipped.
    pub async fn open(root: &Path) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(root).await?;

        let mut collections = HashMap::new();
        let mut entries = tokio::fs::read_dir(root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_owned) else {
                continue;
            };
            if validate_collection(&name).is_err() {
                tracing::warn!(path = %path.display(), "skipping file with invalid collection name");
                continue;
            }

            let raw = tokio::fs::read_to_string(&path).await?;
            let mut skipped = 0usize;
            let docs: Vec<Value> = raw
                .lines()
                .filter(|l| !l.trim().is_empty())
                .filter_map(|l| match serde_json::from_str::<Value>(l) {
                    Ok(v) if v.is_object() => Some(v),
                    _ => {
                        skipped += 1;
                        None
                    }
                })
                .collect();
            if skipped > 0 {
                tracing::warn!(collection = %name, skipped, "skipped unparseable lines");
            }
            collections.insert(name, docs);
        }

        tracing::info!(
            path = %root.display(),
            collections = collections.len(),
            "jsonl store loaded"
        );

        Ok(Self {
            root: root.to_path_buf(),
            collections: Mutex::new(collections),
        })
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{collection}.jsonl"))
    }

    async fn rewrite(&self, collection: &str, docs: &[Value]) -> Result<(), StoreError> {
        let mut buf = String::new();
        for doc in docs {
            buf.push_str(&serde_json::to_string(doc)?);
            buf.push('\n');
        }
        let path = self.collection_path(collection);
        let tmp = path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, buf).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for JsonlStore {
    fn backend(&self) -> &'static str {
        "jsonl"
    }

    async fn insert(&self, collection: &str, record: Value) -> Result<(), StoreError> {
        validate_collection(collection)?;
        ensure_object(collection, &record)?;
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        // Hold the lock across the append so lines never interleave.
        let mut collections = self.collections.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.collection_path(collection))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        collections.entry(collection.to_owned()).or_default().push(record);
        Ok(())
    }

    async fn update(&self, collection: &str, filter: &Value, patch: Value) -> Result<u64, StoreError> {
        validate_collection(collection)?;
        ensure_object(collection, &patch)?;

        let mut collections = self.collections.lock().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };

        // Patch a copy; memory only changes once the file is replaced.
        let mut patched = docs.clone();
        let mut matched = 0;
        for doc in patched.iter_mut().filter(|d| matches_filter(d, filter)) {
            apply_patch(doc, &patch);
            matched += 1;
        }
        if matched > 0 {
            self.rewrite(collection, &patched).await?;
            *docs = patched;
        }
        Ok(matched)
    }

    async fn count(&self, collection: &str, filter: &Value) -> Result<u64, StoreError> {
        validate_collection(collection)?;
        Ok(self
            .collections
            .lock()
            .await
            .get(collection)
            .map(|docs| docs.iter().filter(|d| matches_filter(d, filter)).count() as u64)
            .unwrap_or(0))
    }

    async fn find(&self, collection: &str, filter: &Value, limit: usize) -> Result<Vec<Value>, StoreError> {
        validate_collection(collection)?;
        Ok(self
            .collections
            .lock()
            .await
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
        tokio::fs::metadata(&self.root).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn inserts_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonlStore::open(dir.path()).await.unwrap();
            store.insert("stream_metrics", json!({"session_id": "s1", "fps": 30.0})).await.unwrap();
            store.insert("stream_metrics", json!({"session_id": "s1", "fps": 60.0})).await.unwrap();
        }

        let reopened = JsonlStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.count("stream_metrics", &json!({"session_id": "s1"})).await.unwrap(), 2);
        let raw = std::fs::read_to_string(dir.path().join("stream_metrics.jsonl")).unwrap();
        assert_eq!(raw.lines().count(), 2);
    }

    #[tokio::test]
    async fn update_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::open(dir.path()).await.unwrap();
        store.insert("stream_sessions", json!({"id": "s1", "is_active": true})).await.unwrap();
        store.insert("stream_sessions", json!({"id": "s2", "is_active": true})).await.unwrap();

        let matched = store
            .update("stream_sessions", &json!({"id": "s1"}), json!({"is_active": false}))
            .await
            .unwrap();
        assert_eq!(matched, 1);

        let reopened = JsonlStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.count("stream_sessions", &json!({"is_active": false})).await.unwrap(), 1);
        assert!(!dir.path().join("stream_sessions.jsonl.tmp").exists());
    }

    #[tokio::test]
    async fn failed_rewrite_leaves_documents_unpatched() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::open(dir.path()).await.unwrap();
        store.insert("stream_sessions", json!({"id": "s1", "is_active": true})).await.unwrap();

        // A directory squatting on the temp path makes the rewrite fail.
        std::fs::create_dir(dir.path().join("stream_sessions.jsonl.tmp")).unwrap();

        let result = store
            .update("stream_sessions", &json!({"id": "s1"}), json!({"is_active": false}))
            .await;
        assert!(result.is_err());
        assert_eq!(store.count("stream_sessions", &json!({"is_active": true})).await.unwrap(), 1);
        assert_eq!(store.count("stream_sessions", &json!({"is_active": false})).await.unwrap(), 0);

        let raw = std::fs::read_to_string(dir.path().join("stream_sessions.jsonl")).unwrap();
        assert!(raw.contains("\"is_active\":true"));
    }

    #[tokio::test]
    async fn skips_corrupt_lines_on_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("stream_sessions.jsonl"),
            "{\"id\":\"ok\"}\nnot json\n[1,2]\n\n",
        )
        .unwrap();

        let store = JsonlStore::open(dir.path()).await.unwrap();
        assert_eq!(store.count("stream_sessions", &json!({})).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ping_fails_when_root_removed() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("store");
        let store = JsonlStore::open(&root).await.unwrap();
        assert!(store.ping().await.is_ok());
        std::fs::remove_dir_all(&root).unwrap();
        assert!(store.ping().await.is_err());
    }
}
