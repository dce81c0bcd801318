//! Key-value backend trait

use crate::error::Result;
use crate::record::Datum;
use async_trait::async_trait;
use tracing::warn;

/// One write inside a [`WriteBatch`]
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put { key: String, value: Datum },
    Delete { key: String },
}

impl WriteOp {
    pub fn key(&self) -> &str {
        match self {
            WriteOp::Put { key, .. } | WriteOp::Delete { key } => key,
        }
    }
}

/// Ordered set of writes committed as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: Datum) {
        self.ops.push(WriteOp::Put {
            key: key.into(),
            value,
        });
    }

    pub fn delete(&mut self, key: impl Into<String>) {
        self.ops.push(WriteOp::Delete { key: key.into() });
    }

    pub fn extend(&mut self, ops: impl IntoIterator<Item = WriteOp>) {
        self.ops.extend(ops);
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Ordered key-value storage consumed by the document engine.
///
/// Keys are UTF-8 strings; `list` must return entries in ascending key order.
/// Implementations that can apply a [`WriteBatch`] atomically override
/// `commit` and report it through `supports_atomic_commit`.
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Datum>>;
    async fn put(&self, key: &str, value: Datum) -> Result<()>;

    /// Remove a key, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Every entry whose key starts with `prefix`, in key order
    async fn list(&self, prefix: &str) -> Result<Vec<(String, Datum)>>;

    /// Increment the integer counter stored at `key` and return the new value.
    ///
    /// The default is a plain read-then-write; backends override it when they
    /// can do better.
    async fn increment(&self, key: &str) -> Result<i64> {
        let current = self.get(key).await?.and_then(|v| v.as_i64()).unwrap_or(0);
        let next = current + 1;
        self.put(key, Datum::from(next)).await?;
        Ok(next)
    }

    /// Apply every write of `batch`.
    ///
    /// The default applies them one by one: an interruption midway leaves the
    /// earlier writes in place.
    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.len() > 1 {
            warn!(ops = batch.len(), "Committing batch without atomicity");
        }
        for op in batch.into_ops() {
            match op {
                WriteOp::Put { key, value } => self.put(&key, value).await?,
                WriteOp::Delete { key } => {
                    self.delete(&key).await?;
                }
            }
        }
        Ok(())
    }

    fn supports_atomic_commit(&self) -> bool {
        false
    }
}
