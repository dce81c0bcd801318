//! JSON file backend
//!
//! Keeps the whole keyspace in memory and rewrites a single JSON file on every
//! mutation. Each write goes to a sibling temp file first and is renamed into
//! place, so a crash leaves either the old or the new snapshot.

use crate::error::{Error, Result};
use crate::record::Datum;
use crate::storage::backend::{KeyValueBackend, WriteBatch};
use crate::storage::memory::{apply_op, scan_prefix};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// Single-file JSON snapshot storage
pub struct JsonFileBackend {
    path: PathBuf,
    data: Mutex<BTreeMap<String, Datum>>,
}

impl JsonFileBackend {
    /// Open (or lazily create) the snapshot at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => Self::decode(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(Error::Storage(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        info!(path = %path.display(), keys = data.len(), "Opened JSON file storage");

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn decode(bytes: &[u8]) -> Result<BTreeMap<String, Datum>> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::Storage(format!("JSON deserialization failed: {}", e)))
    }

    async fn persist(&self, data: &BTreeMap<String, Datum>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(data)
            .map_err(|e| Error::Storage(format!("JSON serialization failed: {}", e)))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage(format!("Failed to create {}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| Error::Storage(format!("Failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to replace {}: {}", self.path.display(), e)))?;

        debug!(path = %self.path.display(), keys = data.len(), "Persisted snapshot");
        Ok(())
    }

    /// Apply `change` to a copy of the keyspace, persist it, then publish it.
    async fn mutate<T>(&self, change: impl FnOnce(&mut BTreeMap<String, Datum>) -> T) -> Result<T> {
        let mut data = self.data.lock().await;
        let mut next = data.clone();
        let out = change(&mut next);
        self.persist(&next).await?;
        *data = next;
        Ok(out)
    }
}

#[async_trait]
impl KeyValueBackend for JsonFileBackend {
    async fn get(&self, key: &str) -> Result<Option<Datum>> {
        Ok(self.data.lock().await.get(key).cloned())
    }

    #[instrument(skip(self, value))]
    async fn put(&self, key: &str, value: Datum) -> Result<()> {
        self.mutate(|data| {
            data.insert(key.to_string(), value);
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<bool> {
        {
            let data = self.data.lock().await;
            if !data.contains_key(key) {
                return Ok(false);
            }
        }
        self.mutate(|data| data.remove(key).is_some()).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Datum)>> {
        Ok(scan_prefix(&*self.data.lock().await, prefix))
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        self.mutate(|data| {
            let next = data.get(key).and_then(Datum::as_i64).unwrap_or(0) + 1;
            data.insert(key.to_string(), Datum::from(next));
            next
        })
        .await
    }

    #[instrument(skip(self, batch), fields(ops = batch.len()))]
    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.mutate(|data| {
            for op in batch.into_ops() {
                apply_op(data, op);
            }
        })
        .await
    }

    fn supports_atomic_commit(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_backend_survives_reopen() -> Result<()> {
        let dir = tempfile::tempdir().map_err(|e| Error::Storage(e.to_string()))?;
        let path = dir.path().join("store.json");

        let storage = JsonFileBackend::open(&path).await?;
        storage.put("notes:1", Datum::from("first")).await?;
        let mut batch = WriteBatch::new();
        batch.put("notes:2", Datum::from("second"));
        batch.put("notes_creator_idx", Datum::Object(BTreeMap::new()));
        storage.commit(batch).await?;
        assert_eq!(storage.increment("notes_counter").await?, 1);
        drop(storage);

        let reopened = JsonFileBackend::open(&path).await?;
        assert_eq!(reopened.get("notes:1").await?, Some(Datum::from("first")));
        assert_eq!(reopened.list("notes:").await?.len(), 2);
        assert_eq!(reopened.increment("notes_counter").await?, 2);
        assert!(reopened.delete("notes:1").await?);
        assert!(!reopened.delete("notes:1").await?);

        Ok(())
    }

    #[tokio::test]
    async fn test_file_backend_rejects_corrupt_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, b"not json").unwrap();

        let result = JsonFileBackend::open(&path).await;
        assert!(matches!(result, Err(Error::Storage(_))));
    }
}
