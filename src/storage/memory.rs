//! In-memory backend
//!
//! An ordered map behind a lock. Used by the test suite and by embedders that
//! bring their own persistence.

use crate::error::Result;
use crate::record::Datum;
use crate::storage::backend::{KeyValueBackend, WriteBatch, WriteOp};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// In-memory ordered key-value store
#[derive(Clone, Default)]
pub struct MemoryBackend {
    data: Arc<RwLock<BTreeMap<String, Datum>>>,
}

impl MemoryBackend {
    /// Create a new empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of keys stored
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if storage is empty
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// All keys, in order
    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }

    /// Clear all data
    pub fn clear(&self) {
        self.data.write().clear();
    }
}

pub(crate) fn apply_op(data: &mut BTreeMap<String, Datum>, op: WriteOp) {
    match op {
        WriteOp::Put { key, value } => {
            data.insert(key, value);
        }
        WriteOp::Delete { key } => {
            data.remove(&key);
        }
    }
}

pub(crate) fn scan_prefix(data: &BTreeMap<String, Datum>, prefix: &str) -> Vec<(String, Datum)> {
    data.range(prefix.to_string()..)
        .take_while(|(key, _)| key.starts_with(prefix))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[async_trait]
impl KeyValueBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Datum>> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Datum) -> Result<()> {
        self.data.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.data.write().remove(key).is_some())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Datum)>> {
        let entries = scan_prefix(&self.data.read(), prefix);
        debug!(prefix = %prefix, count = entries.len(), "Listed prefix");
        Ok(entries)
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        let mut data = self.data.write();
        let next = data.get(key).and_then(Datum::as_i64).unwrap_or(0) + 1;
        data.insert(key.to_string(), Datum::from(next));
        Ok(next)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        let mut data = self.data.write();
        for op in batch.into_ops() {
            apply_op(&mut data, op);
        }
        Ok(())
    }

    fn supports_atomic_commit(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_basic_ops() -> Result<()> {
        let storage = MemoryBackend::new();

        let datum = Datum::String("test value".to_string());
        storage.put("key1", datum.clone()).await?;

        let retrieved = storage.get("key1").await?;
        assert_eq!(retrieved, Some(datum));

        assert!(storage.delete("key1").await?);
        assert!(!storage.delete("key1").await?);
        assert_eq!(storage.get("key1").await?, None);

        Ok(())
    }

    #[tokio::test]
    async fn test_list_is_ordered_and_prefix_bounded() -> Result<()> {
        let storage = MemoryBackend::new();
        storage.put("notes:b", Datum::from(2)).await?;
        storage.put("notes:a", Datum::from(1)).await?;
        storage.put("notes_creator_idx", Datum::from(0)).await?;
        storage.put("users:a", Datum::from(3)).await?;

        let listed = storage.list("notes:").await?;
        let keys: Vec<_> = listed.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["notes:a", "notes:b"]);

        Ok(())
    }

    #[tokio::test]
    async fn test_increment_and_commit() -> Result<()> {
        let storage = MemoryBackend::new();
        assert_eq!(storage.increment("notes_counter").await?, 1);
        assert_eq!(storage.increment("notes_counter").await?, 2);

        let mut batch = WriteBatch::new();
        batch.put("a", Datum::from(1));
        batch.put("b", Datum::from(2));
        batch.delete("notes_counter");
        storage.commit(batch).await?;

        assert_eq!(storage.keys(), vec!["a".to_string(), "b".to_string()]);

        storage.clear();
        assert!(storage.is_empty());
        Ok(())
    }
}
