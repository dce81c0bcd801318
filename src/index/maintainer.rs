//! Index maintenance for one table.
//!
//! Every mutation is turned into a *plan*: the write operations that move each
//! index from the state implied by the old record to the state implied by the
//! new one. Uniqueness is checked while planning, so a violation is reported
//! before the caller has written anything. The caller commits the plan in the
//! same [`WriteBatch`] as the record itself.

use super::{IndexDefinition, IndexOp};
use crate::config::IndexLayout;
use crate::error::{Error, Result};
use crate::record::{Datum, Record, RecordId, ID_FIELD};
use crate::storage::{KeyValueBackend, WriteBatch, WriteOp};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Keeps the secondary indexes of one table in sync with its records.
pub struct IndexMaintainer {
    table: String,
    indexes: Vec<IndexDefinition>,
    layout: IndexLayout,
    backend: Arc<dyn KeyValueBackend>,
}

impl std::fmt::Debug for IndexMaintainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexMaintainer")
            .field("table", &self.table)
            .field("indexes", &self.indexes)
            .field("layout", &self.layout)
            .finish()
    }
}

/// (composite key, id value) a record contributes to one index
type Entry = (String, Datum);

impl IndexMaintainer {
    pub fn new(
        table: impl Into<String>,
        indexes: Vec<IndexDefinition>,
        layout: IndexLayout,
        backend: Arc<dyn KeyValueBackend>,
    ) -> Result<Self> {
        for index in &indexes {
            index.validate()?;
        }
        for (i, index) in indexes.iter().enumerate() {
            if indexes[..i].iter().any(|other| other.name == index.name) {
                return Err(Error::Validation(format!(
                    "index '{}' declared twice",
                    index.name
                )));
            }
        }

        Ok(Self {
            table: table.into(),
            indexes,
            layout,
            backend,
        })
    }

    pub fn indexes(&self) -> &[IndexDefinition] {
        &self.indexes
    }

    pub fn layout(&self) -> IndexLayout {
        self.layout
    }

    fn index(&self, name: &str) -> Result<&IndexDefinition> {
        self.indexes
            .iter()
            .find(|index| index.name == name)
            .ok_or_else(|| {
                Error::Validation(format!("table '{}' has no index '{}'", self.table, name))
            })
    }

    fn entry(index: &IndexDefinition, record: &Record) -> Entry {
        let id = record.get(ID_FIELD).cloned().unwrap_or(Datum::Null);
        (index.composite_key(record), id)
    }

    /// Apply a single Add or Remove for `record` across every index and commit it.
    #[instrument(skip(self, record), fields(table = %self.table))]
    pub async fn apply(&self, record: &Record, op: IndexOp) -> Result<()> {
        let ops = match op {
            IndexOp::Add => self.plan(None, Some(record)).await?,
            IndexOp::Remove => self.plan(Some(record), None).await?,
        };
        if ops.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::new();
        batch.extend(ops);
        self.backend.commit(batch).await
    }

    /// Writes that retract `old`'s entries and install `new`'s.
    ///
    /// Fails with [`Error::IndexViolation`] if a unique index already maps the
    /// new composite key to a different record.
    pub async fn plan(&self, old: Option<&Record>, new: Option<&Record>) -> Result<Vec<WriteOp>> {
        let mut ops = Vec::new();
        for index in &self.indexes {
            let old_entry = old.map(|record| Self::entry(index, record));
            let new_entry = new.map(|record| Self::entry(index, record));
            match self.layout {
                IndexLayout::Blob => {
                    self.plan_blob(index, old_entry, new_entry, &mut ops).await?
                }
                IndexLayout::PerEntry => {
                    self.plan_entries(index, old_entry, new_entry, &mut ops)
                        .await?
                }
            }
        }
        Ok(ops)
    }

    async fn load_blob(&self, index: &IndexDefinition) -> Result<BTreeMap<String, Datum>> {
        let key = index.blob_key(&self.table);
        match self.backend.get(&key).await? {
            None => Ok(BTreeMap::new()),
            Some(Datum::Object(map)) => Ok(map),
            Some(other) => Err(Error::Storage(format!(
                "index '{}' holds {} instead of a map",
                key,
                other.type_name()
            ))),
        }
    }

    async fn plan_blob(
        &self,
        index: &IndexDefinition,
        old: Option<Entry>,
        new: Option<Entry>,
        ops: &mut Vec<WriteOp>,
    ) -> Result<()> {
        let mut map = self.load_blob(index).await?;
        let mut dirty = false;

        if let Some((key, id)) = old {
            if map.get(&key) == Some(&id) {
                map.remove(&key);
                dirty = true;
            }
        }

        if let Some((key, id)) = new {
            match map.get(&key) {
                Some(existing) if *existing == id => {}
                Some(existing) if index.unique => {
                    warn!(index = %index.name, value = %key, holder = %existing, "Unique index violation");
                    return Err(Error::IndexViolation {
                        index: index.name.clone(),
                        value: key,
                    });
                }
                _ => {
                    map.insert(key, id);
                    dirty = true;
                }
            }
        }

        if dirty {
            ops.push(WriteOp::Put {
                key: index.blob_key(&self.table),
                value: Datum::Object(map),
            });
        }
        Ok(())
    }

    async fn plan_entries(
        &self,
        index: &IndexDefinition,
        old: Option<Entry>,
        new: Option<Entry>,
        ops: &mut Vec<WriteOp>,
    ) -> Result<()> {
        let mut retracted = None;
        if let Some((key, id)) = old {
            let entry_key = index.entry_key(&self.table, &key);
            if self.backend.get(&entry_key).await? == Some(id) {
                retracted = Some(entry_key);
            }
        }

        if let Some((key, id)) = new {
            let entry_key = index.entry_key(&self.table, &key);
            let current = if retracted.as_deref() == Some(entry_key.as_str()) {
                None
            } else {
                self.backend.get(&entry_key).await?
            };
            match current {
                Some(existing) if existing == id => {}
                Some(existing) if index.unique => {
                    warn!(index = %index.name, value = %key, holder = %existing, "Unique index violation");
                    return Err(Error::IndexViolation {
                        index: index.name.clone(),
                        value: key,
                    });
                }
                _ => {
                    if retracted.as_deref() == Some(entry_key.as_str()) {
                        // Same slot: overwrite instead of delete + put.
                        retracted = None;
                    }
                    ops.push(WriteOp::Put {
                        key: entry_key,
                        value: id,
                    });
                }
            }
        }

        if let Some(entry_key) = retracted {
            ops.push(WriteOp::Delete { key: entry_key });
        }
        Ok(())
    }

    /// Look up the record id stored under `values` in index `name`.
    pub async fn lookup(&self, name: &str, values: &[Datum]) -> Result<Option<RecordId>> {
        let index = self.index(name)?;
        let composite = index.composite_key_of(values)?;
        let stored = match self.layout {
            IndexLayout::Blob => self.load_blob(index).await?.remove(&composite),
            IndexLayout::PerEntry => {
                self.backend
                    .get(&index.entry_key(&self.table, &composite))
                    .await?
            }
        };
        stored.map(|id| RecordId::from_datum(&id)).transpose()
    }

    /// Full mapping of index `name`, composite key → id.
    pub async fn entries(&self, name: &str) -> Result<BTreeMap<String, Datum>> {
        let index = self.index(name)?;
        match self.layout {
            IndexLayout::Blob => self.load_blob(index).await,
            IndexLayout::PerEntry => {
                let prefix = index.entry_prefix(&self.table);
                Ok(self
                    .backend
                    .list(&prefix)
                    .await?
                    .into_iter()
                    .map(|(key, id)| (key[prefix.len()..].to_string(), id))
                    .collect())
            }
        }
    }

    /// Discard every index and rebuild it from `records` in one commit.
    #[instrument(skip(self, records), fields(table = %self.table, records = records.len()))]
    pub async fn rebuild(&self, records: &[Record]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.extend(self.plan_rebuild(records).await?);
        self.backend.commit(batch).await
    }

    /// Writes that discard every index and rebuild them from `records`.
    ///
    /// A unique conflict among `records` is reported as an
    /// [`Error::IndexViolation`]; nothing should be committed in that case.
    pub async fn plan_rebuild(&self, records: &[Record]) -> Result<Vec<WriteOp>> {
        let mut ops = Vec::new();
        for index in &self.indexes {
            let mut map: BTreeMap<String, Datum> = BTreeMap::new();
            for record in records {
                let (key, id) = Self::entry(index, record);
                match map.get(&key) {
                    Some(existing) if index.unique && *existing != id => {
                        return Err(Error::IndexViolation {
                            index: index.name.clone(),
                            value: key,
                        });
                    }
                    _ => {
                        map.insert(key, id);
                    }
                }
            }

            match self.layout {
                IndexLayout::Blob => ops.push(WriteOp::Put {
                    key: index.blob_key(&self.table),
                    value: Datum::Object(map),
                }),
                IndexLayout::PerEntry => {
                    let prefix = index.entry_prefix(&self.table);
                    for (key, _) in self.backend.list(&prefix).await? {
                        ops.push(WriteOp::Delete { key });
                    }
                    for (composite, id) in map {
                        ops.push(WriteOp::Put {
                            key: index.entry_key(&self.table, &composite),
                            value: id,
                        });
                    }
                }
            }
            debug!(table = %self.table, index = %index.name, "Planned index rebuild");
        }
        Ok(ops)
    }
}
