//! Table-scoped CRUD façade.
//!
//! A [`DocumentModel`] owns one table: its records under `<table>:`, its
//! secondary indexes and its id counter. Every mutating operation runs under
//! the model's write lock, so index read-modify-write cycles on the same table
//! never interleave. The record write and the index writes of one mutation are
//! committed as a single [`WriteBatch`]; on a backend with atomic commits a
//! failed mutation leaves nothing behind.
//!
//! # Example
//!
//! ```rust
//! use docstore::{DocumentModel, IndexDefinition, MemoryBackend, Record, StoreConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> docstore::error::Result<()> {
//! let users = DocumentModel::new(
//!     "users",
//!     vec![IndexDefinition::new("email_idx", ["email"]).unique()],
//!     None,
//!     &StoreConfig::default(),
//!     Arc::new(MemoryBackend::new()),
//! )?;
//!
//! let alice = users.create(Record::new().with("email", "alice@example.com")).await?;
//! assert_eq!(alice.created(), alice.modified());
//! # Ok(())
//! # }
//! ```

use super::registry::{attach_includes, ModelMap};
use crate::config::{IdStrategy, StoreConfig};
use crate::error::{Error, Result};
use crate::index::{validate_name, IndexDefinition, IndexMaintainer};
use crate::query::{Filter, IncludeOptions, QueryExecutor, QueryOptions};
use crate::record::{Datum, Record, RecordId, TableSchema, CREATED_FIELD, ID_FIELD, MODIFIED_FIELD};
use crate::storage::{counter_key, record_key, record_prefix, KeyValueBackend, WriteBatch};
use serde::Serialize;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// CRUD engine for one table
pub struct DocumentModel {
    table: String,
    backend: Arc<dyn KeyValueBackend>,
    indexes: IndexMaintainer,
    executor: QueryExecutor,
    schema: Option<TableSchema>,
    id_strategy: IdStrategy,
    /// Write lock; holds the last timestamp this model issued.
    clock: Mutex<i64>,
    relations: Weak<ModelMap>,
}

impl std::fmt::Debug for DocumentModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentModel")
            .field("table", &self.table)
            .field("indexes", &self.indexes)
            .field("id_strategy", &self.id_strategy)
            .finish()
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Next timestamp: wall clock, but always past `last` and `after`.
fn tick(last: &mut i64, after: Option<i64>) -> i64 {
    let floor = (*last).max(after.unwrap_or(i64::MIN));
    let ts = now_millis().max(floor.saturating_add(1));
    *last = ts;
    ts
}

fn decode(key: &str, value: Datum) -> Result<Record> {
    match value {
        Datum::Object(fields) => Ok(Record::from(fields)),
        other => Err(Error::Storage(format!(
            "key '{}' holds {} instead of a record",
            key,
            other.type_name()
        ))),
    }
}

/// Engine managed fields are dropped from patches.
fn sanitize_patch(mut patch: Record) -> Record {
    patch.remove(ID_FIELD);
    patch.remove(CREATED_FIELD);
    patch.remove(MODIFIED_FIELD);
    patch
}

/// Caller supplied id, if any. A null id counts as absent.
fn supplied_id(data: &Record) -> Result<Option<RecordId>> {
    match data.get(ID_FIELD) {
        None | Some(Datum::Null) => Ok(None),
        Some(value) => RecordId::from_datum(value).map(Some),
    }
}

impl DocumentModel {
    pub fn new(
        table: impl Into<String>,
        indexes: Vec<IndexDefinition>,
        schema: Option<TableSchema>,
        config: &StoreConfig,
        backend: Arc<dyn KeyValueBackend>,
    ) -> Result<Self> {
        let table = table.into();
        validate_name("table", &table)?;
        let indexes = IndexMaintainer::new(table.clone(), indexes, config.index_layout, backend.clone())?;

        if !backend.supports_atomic_commit() {
            warn!(table = %table, "Backend commits are not atomic; use rebuild_indexes() after a crash");
        }

        Ok(Self {
            table,
            backend,
            indexes,
            executor: QueryExecutor::new(config.comparison_policy),
            schema,
            id_strategy: config.id_strategy,
            clock: Mutex::new(0),
            relations: Weak::new(),
        })
    }

    pub(crate) fn with_relations(mut self, relations: Weak<ModelMap>) -> Self {
        self.relations = relations;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn indexes(&self) -> &[IndexDefinition] {
        self.indexes.indexes()
    }

    pub fn schema(&self) -> Option<&TableSchema> {
        self.schema.as_ref()
    }

    pub fn index_maintainer(&self) -> &IndexMaintainer {
        &self.indexes
    }

    /// Insert a new record.
    ///
    /// `created` and `modified` are always stamped by the engine. Fails with
    /// [`Error::AlreadyExists`] if the id is taken and
    /// [`Error::IndexViolation`] on a unique index conflict.
    #[instrument(skip(self, data), fields(table = %self.table))]
    pub async fn create(&self, data: Record) -> Result<Record> {
        let mut clock = self.clock.lock().await;
        self.create_locked(&mut clock, data).await
    }

    /// Serialize `value` and insert it
    pub async fn create_typed<T: Serialize>(&self, value: &T) -> Result<Record> {
        self.create(Record::from_serializable(value)?).await
    }

    /// Sequential creates. Not atomic as a batch: records created before a
    /// failure stay committed.
    #[instrument(skip(self, records), fields(table = %self.table, count = records.len()))]
    pub async fn create_many(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        let mut clock = self.clock.lock().await;
        let mut created = Vec::with_capacity(records.len());
        for data in records {
            created.push(self.create_locked(&mut clock, data).await?);
        }
        Ok(created)
    }

    /// Pick an unused id for a record created without one.
    ///
    /// Counter ids skip values already taken by caller supplied ids. The new
    /// counter value is returned so it commits in the same batch as the record.
    async fn generate_id(&self) -> Result<(RecordId, Option<i64>)> {
        match self.id_strategy {
            IdStrategy::Counter => {
                let mut next = self
                    .backend
                    .get(&counter_key(&self.table))
                    .await?
                    .and_then(|value| value.as_i64())
                    .unwrap_or(0);
                loop {
                    next += 1;
                    let id = RecordId::String(next.to_string());
                    if self.backend.get(&record_key(&self.table, &id)).await?.is_none() {
                        return Ok((id, Some(next)));
                    }
                    debug!(table = %self.table, id = %id, "Counter id taken; skipping");
                }
            }
            IdStrategy::Uuid => Ok((RecordId::String(uuid::Uuid::new_v4().to_string()), None)),
            IdStrategy::Required => Err(Error::Validation(format!(
                "records of '{}' require an id",
                self.table
            ))),
        }
    }

    async fn create_locked(&self, clock: &mut i64, mut data: Record) -> Result<Record> {
        if let Some(schema) = &self.schema {
            schema.validate_record(&data)?;
        }

        let (id, counter) = match supplied_id(&data)? {
            Some(id) => {
                let key = record_key(&self.table, &id);
                if self.backend.get(&key).await?.is_some() {
                    return Err(Error::AlreadyExists(key));
                }
                (id, None)
            }
            None => self.generate_id().await?,
        };
        let key = record_key(&self.table, &id);

        let ts = tick(clock, None);
        data.insert(ID_FIELD, id.to_datum());
        data.insert(CREATED_FIELD, ts);
        data.insert(MODIFIED_FIELD, ts);

        let mut batch = WriteBatch::new();
        batch.put(key, Datum::from(data.clone()));
        batch.extend(self.indexes.plan(None, Some(&data)).await?);
        if let Some(counter) = counter {
            batch.put(counter_key(&self.table), Datum::from(counter));
        }
        self.backend.commit(batch).await?;

        debug!(table = %self.table, id = %id, "Created record");
        Ok(data)
    }

    /// Point lookup; `None` when absent
    pub async fn find_by_id(&self, id: impl Into<RecordId>) -> Result<Option<Record>> {
        let key = record_key(&self.table, &id.into());
        self.backend
            .get(&key)
            .await?
            .map(|value| decode(&key, value))
            .transpose()
    }

    /// Point lookup with related records attached (see [`IncludeOptions`])
    pub async fn find_by_id_with(
        &self,
        id: impl Into<RecordId>,
        include: &[IncludeOptions],
    ) -> Result<Option<Record>> {
        let Some(record) = self.find_by_id(id).await? else {
            return Ok(None);
        };
        let mut records = [record];
        if !include.is_empty() {
            self.load_includes(&mut records, include).await?;
        }
        let [record] = records;
        Ok(Some(record))
    }

    /// Every record of the table, in key order
    pub async fn scan(&self) -> Result<Vec<Record>> {
        self.backend
            .list(&record_prefix(&self.table))
            .await?
            .into_iter()
            .map(|(key, value)| decode(&key, value))
            .collect()
    }

    /// Full scan, then filter, sort and paginate.
    #[instrument(skip(self, options), fields(table = %self.table))]
    pub async fn find_all(&self, options: &QueryOptions) -> Result<Vec<Record>> {
        let records = self.scan().await?;
        let mut results = self.executor.run(records, options);
        if !options.include.is_empty() {
            self.load_includes(&mut results, &options.include).await?;
        }
        Ok(results)
    }

    /// First match of `find_all`
    pub async fn find_one(&self, options: &QueryOptions) -> Result<Option<Record>> {
        let options = options.clone().limit(1);
        Ok(self.find_all(&options).await?.into_iter().next())
    }

    pub async fn count(&self, filter: &Filter) -> Result<usize> {
        let records = self.scan().await?;
        Ok(records
            .iter()
            .filter(|record| self.executor.matches(record, filter))
            .count())
    }

    pub async fn exists(&self, filter: &Filter) -> Result<bool> {
        let records = self.scan().await?;
        Ok(records
            .iter()
            .any(|record| self.executor.matches(record, filter)))
    }

    /// Record whose index entry under `index` matches `values`
    pub async fn find_by_index(&self, index: &str, values: &[Datum]) -> Result<Option<Record>> {
        match self.indexes.lookup(index, values).await? {
            Some(id) => self.find_by_id(id).await,
            None => Ok(None),
        }
    }

    async fn load_includes(&self, records: &mut [Record], includes: &[IncludeOptions]) -> Result<()> {
        match self.relations.upgrade() {
            Some(models) => attach_includes(&models, records, includes).await,
            None => Err(Error::Validation(format!(
                "model '{}' is not registered; includes need a ModelRegistry",
                self.table
            ))),
        }
    }

    /// Merge `patch` over the stored record; `None` if it does not exist.
    ///
    /// `id`, `created` and `modified` in the patch are ignored.
    #[instrument(skip(self, id, patch), fields(table = %self.table))]
    pub async fn update(&self, id: impl Into<RecordId>, patch: Record) -> Result<Option<Record>> {
        let mut clock = self.clock.lock().await;
        self.update_locked(&mut clock, &id.into(), patch).await
    }

    /// Update every record matching `filter`; returns how many were updated.
    #[instrument(skip(self, filter, patch), fields(table = %self.table))]
    pub async fn update_where(&self, filter: &Filter, patch: Record) -> Result<usize> {
        let mut clock = self.clock.lock().await;
        let mut updated = 0;
        for id in self.matching_ids(filter).await? {
            if self
                .update_locked(&mut clock, &id, patch.clone())
                .await?
                .is_some()
            {
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn update_locked(&self, clock: &mut i64, id: &RecordId, patch: Record) -> Result<Option<Record>> {
        let Some(existing) = self.find_by_id(id.clone()).await? else {
            return Ok(None);
        };

        let patch = sanitize_patch(patch);
        if let Some(schema) = &self.schema {
            schema.validate_patch(&patch)?;
        }

        let mut updated = existing.clone();
        updated.merge(patch);
        let ts = tick(clock, existing.modified());
        updated.insert(MODIFIED_FIELD, ts);

        let mut batch = WriteBatch::new();
        batch.put(record_key(&self.table, id), Datum::from(updated.clone()));
        batch.extend(self.indexes.plan(Some(&existing), Some(&updated)).await?);
        self.backend.commit(batch).await?;

        debug!(table = %self.table, id = %id, "Updated record");
        Ok(Some(updated))
    }

    /// Remove a record and its index entries; `false` if it does not exist.
    #[instrument(skip(self, id), fields(table = %self.table))]
    pub async fn delete(&self, id: impl Into<RecordId>) -> Result<bool> {
        let _clock = self.clock.lock().await;
        self.delete_locked(&id.into()).await
    }

    /// Delete every record matching `filter`; returns how many were deleted.
    #[instrument(skip(self, filter), fields(table = %self.table))]
    pub async fn delete_where(&self, filter: &Filter) -> Result<usize> {
        let _clock = self.clock.lock().await;
        let mut deleted = 0;
        for id in self.matching_ids(filter).await? {
            if self.delete_locked(&id).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn delete_locked(&self, id: &RecordId) -> Result<bool> {
        let Some(existing) = self.find_by_id(id.clone()).await? else {
            return Ok(false);
        };

        let mut batch = WriteBatch::new();
        batch.delete(record_key(&self.table, id));
        batch.extend(self.indexes.plan(Some(&existing), None).await?);
        self.backend.commit(batch).await?;

        debug!(table = %self.table, id = %id, "Deleted record");
        Ok(true)
    }

    async fn matching_ids(&self, filter: &Filter) -> Result<Vec<RecordId>> {
        let records = self.scan().await?;
        Ok(records
            .iter()
            .filter(|record| self.executor.matches(record, filter))
            .filter_map(Record::id)
            .collect())
    }

    /// Update the record named by `data.id` if it exists, otherwise create.
    ///
    /// Fields absent from `data` survive the update; fields set to null are
    /// written as null.
    #[instrument(skip(self, data), fields(table = %self.table))]
    pub async fn upsert(&self, data: Record) -> Result<Record> {
        let mut clock = self.clock.lock().await;
        self.upsert_locked(&mut clock, data, false).await
    }

    /// Like [`upsert`](Self::upsert), but null fields of `data` never
    /// overwrite an existing record's values.
    #[instrument(skip(self, data), fields(table = %self.table))]
    pub async fn upsert_with_coalesce(&self, data: Record) -> Result<Record> {
        let mut clock = self.clock.lock().await;
        self.upsert_locked(&mut clock, data, true).await
    }

    async fn upsert_locked(&self, clock: &mut i64, data: Record, coalesce: bool) -> Result<Record> {
        if let Some(id) = supplied_id(&data)? {
            let patch = if coalesce { data.clone().without_nulls() } else { data.clone() };
            if let Some(updated) = self.update_locked(clock, &id, patch).await? {
                return Ok(updated);
            }
        }
        self.create_locked(clock, data).await
    }

    /// Rebuild every index from the stored records.
    ///
    /// Repairs indexes left stale by an interrupted non-atomic commit. Returns
    /// the number of records indexed.
    #[instrument(skip(self), fields(table = %self.table))]
    pub async fn rebuild_indexes(&self) -> Result<usize> {
        let _clock = self.clock.lock().await;
        let records = self.scan().await?;
        self.indexes.rebuild(&records).await?;
        info!(table = %self.table, records = records.len(), "Rebuilt indexes");
        Ok(records.len())
    }
}
