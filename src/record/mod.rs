//! Records and their field values.
//!
//! # Layout
//!
//! A record is a flat map of field name → [`Datum`]. Three fields are managed
//! by the engine:
//!
//! - `id`: primary key, caller supplied or generated (see [`RecordId`])
//! - `created`: milliseconds since the Unix epoch, stamped once on create
//! - `modified`: milliseconds since the Unix epoch, refreshed on every mutation
//!
//! Records are stored as JSON objects under `"<table>:<id>"`.

pub mod datum;
pub mod id;
pub mod schema;

pub use datum::Datum;
pub use id::RecordId;
pub use schema::{FieldSpec, FieldType, TableSchema};

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Primary key field
pub const ID_FIELD: &str = "id";
/// Creation timestamp field
pub const CREATED_FIELD: &str = "created";
/// Last modification timestamp field
pub const MODIFIED_FIELD: &str = "modified";

/// A single document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Datum>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Datum>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Datum> {
        self.fields.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Datum>) -> Option<Datum> {
        self.fields.insert(field.into(), value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<Datum> {
        self.fields.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn fields(&self) -> &BTreeMap<String, Datum> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The record's id, if present and well formed.
    pub fn id(&self) -> Option<RecordId> {
        self.fields
            .get(ID_FIELD)
            .and_then(|value| RecordId::from_datum(value).ok())
    }

    pub fn created(&self) -> Option<i64> {
        self.fields.get(CREATED_FIELD).and_then(Datum::as_i64)
    }

    pub fn modified(&self) -> Option<i64> {
        self.fields.get(MODIFIED_FIELD).and_then(Datum::as_i64)
    }

    /// Overlay every field of `patch` onto this record.
    pub fn merge(&mut self, patch: Record) {
        self.fields.extend(patch.fields);
    }

    /// Drop every null field.
    pub fn without_nulls(mut self) -> Self {
        self.fields.retain(|_, value| !value.is_null());
        self
    }

    /// Build a record from a JSON object.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        match Datum::from(value) {
            Datum::Object(fields) => Ok(Self { fields }),
            other => Err(Error::Validation(format!(
                "record must be a JSON object, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::from(Datum::Object(self.fields.clone()))
    }

    /// Build a record from any serializable struct.
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self> {
        Self::from_json(serde_json::to_value(value)?)
    }

    /// Decode the record into a typed struct.
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.to_json())?)
    }
}

impl From<BTreeMap<String, Datum>> for Record {
    fn from(fields: BTreeMap<String, Datum>) -> Self {
        Self { fields }
    }
}

impl From<Record> for Datum {
    fn from(record: Record) -> Self {
        Datum::Object(record.fields)
    }
}

impl FromIterator<(String, Datum)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Datum)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
