//! Model registry - one shared model per table

use super::DocumentModel;
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::index::IndexDefinition;
use crate::query::IncludeOptions;
use crate::record::{Datum, Record, TableSchema};
use crate::storage::KeyValueBackend;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub(crate) type ModelMap = DashMap<String, Arc<DocumentModel>>;

/// Attach, for each include, the records of the related model whose
/// `foreign_key` equals the record's `local_key`.
pub(crate) async fn attach_includes(
    models: &ModelMap,
    records: &mut [Record],
    includes: &[IncludeOptions],
) -> Result<()> {
    for include in includes {
        // No shard lock may be held across the scan.
        let related = models
            .get(&include.model)
            .map(|model| model.value().clone())
            .ok_or_else(|| {
                Error::Validation(format!("cannot include unknown model '{}'", include.model))
            })?;

        let candidates = related.scan().await?;
        for record in records.iter_mut() {
            let matches: Vec<Datum> = match record.get(&include.local_key) {
                None | Some(Datum::Null) => Vec::new(),
                Some(local) => candidates
                    .iter()
                    .filter(|candidate| candidate.get(&include.foreign_key) == Some(local))
                    .cloned()
                    .map(Datum::from)
                    .collect(),
            };
            record.insert(include.target_field(), Datum::Array(matches));
        }
    }
    Ok(())
}

/// Registry of document models sharing one backend.
///
/// The first definition of a table wins: later `define_model` calls for the
/// same table return the cached model and ignore their index list.
pub struct ModelRegistry {
    backend: Arc<dyn KeyValueBackend>,
    config: StoreConfig,
    models: Arc<ModelMap>,
}

impl ModelRegistry {
    pub fn new(backend: Arc<dyn KeyValueBackend>, config: StoreConfig) -> Self {
        Self {
            backend,
            config,
            models: Arc::new(DashMap::new()),
        }
    }

    /// Return the model for `table`, creating it on first use
    pub fn define_model(&self, table: &str, indexes: Vec<IndexDefinition>) -> Result<Arc<DocumentModel>> {
        self.define(table, indexes, None)
    }

    /// Like [`define_model`](Self::define_model), validating writes against `schema`
    pub fn define_model_with_schema(
        &self,
        table: &str,
        indexes: Vec<IndexDefinition>,
        schema: TableSchema,
    ) -> Result<Arc<DocumentModel>> {
        self.define(table, indexes, Some(schema))
    }

    fn define(
        &self,
        table: &str,
        indexes: Vec<IndexDefinition>,
        schema: Option<TableSchema>,
    ) -> Result<Arc<DocumentModel>> {
        match self.models.entry(table.to_string()) {
            Entry::Occupied(entry) => {
                if !indexes.is_empty() && entry.get().indexes() != indexes.as_slice() {
                    debug!(table = %table, "Model already defined; ignoring new index list");
                }
                Ok(entry.get().clone())
            }
            Entry::Vacant(entry) => {
                let model = DocumentModel::new(table, indexes, schema, &self.config, self.backend.clone())?
                    .with_relations(Arc::downgrade(&self.models));
                let model = Arc::new(model);
                entry.insert(model.clone());
                info!(table = %table, indexes = model.indexes().len(), "Defined model");
                Ok(model)
            }
        }
    }

    /// Previously defined model for `table`
    pub fn model(&self, table: &str) -> Result<Arc<DocumentModel>> {
        self.models
            .get(table)
            .map(|model| model.value().clone())
            .ok_or_else(|| Error::NotFound(format!("model '{}'", table)))
    }

    /// Names of every defined table, sorted
    pub fn tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self.models.iter().map(|m| m.key().clone()).collect();
        tables.sort();
        tables
    }

    /// Resolve eager-load hints against the models of this registry
    pub async fn load_includes(&self, records: &mut [Record], includes: &[IncludeOptions]) -> Result<()> {
        attach_includes(&self.models, records, includes).await
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn backend(&self) -> Arc<dyn KeyValueBackend> {
        self.backend.clone()
    }
}
