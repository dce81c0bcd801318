//! Secondary indexes
//!
//! An index maps the *composite key* of a record (the values of the index's
//! fields, in declared order, joined by [`COMPOSITE_SEPARATOR`]) to the
//! record's id. A missing or null field contributes an empty segment.
//!
//! The separator is not escaped: values containing `:` can make two different
//! field tuples produce the same composite key. Callers that index free-form
//! text should keep that in mind.

pub mod maintainer;

pub use maintainer::IndexMaintainer;

use crate::error::{Error, Result};
use crate::record::{Datum, Record};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between composite key segments
pub const COMPOSITE_SEPARATOR: &str = ":";

/// Index mutation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOp {
    Add,
    Remove,
}

/// Declared secondary index of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub fields: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl IndexDefinition {
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_name("index", &self.name)?;
        if self.name == "counter" {
            return Err(Error::Validation(
                "index name 'counter' is reserved".to_string(),
            ));
        }
        if self.fields.is_empty() {
            return Err(Error::Validation(format!(
                "index '{}' must declare at least one field",
                self.name
            )));
        }
        Ok(())
    }

    /// Composite key of `record` for this index
    pub fn composite_key(&self, record: &Record) -> String {
        self.fields
            .iter()
            .map(|field| record.get(field).map(Datum::key_segment).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(COMPOSITE_SEPARATOR)
    }

    /// Composite key built from explicit values, for lookups
    pub fn composite_key_of(&self, values: &[Datum]) -> Result<String> {
        if values.len() != self.fields.len() {
            return Err(Error::Validation(format!(
                "index '{}' expects {} values, got {}",
                self.name,
                self.fields.len(),
                values.len()
            )));
        }
        Ok(values
            .iter()
            .map(Datum::key_segment)
            .collect::<Vec<_>>()
            .join(COMPOSITE_SEPARATOR))
    }

    /// Key holding the whole index map (blob layout)
    pub fn blob_key(&self, table: &str) -> String {
        format!("{}_{}", table, self.name)
    }

    /// Prefix of every entry of this index (per-entry layout)
    pub fn entry_prefix(&self, table: &str) -> String {
        format!("{}_{}/", table, self.name)
    }

    pub fn entry_key(&self, table: &str, composite: &str) -> String {
        format!("{}{}", self.entry_prefix(table), composite)
    }
}

impl fmt::Display for IndexDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self.fields.join(", ");

        if self.unique {
            write!(f, "UNIQUE {}({})", self.name, fields)
        } else {
            write!(f, "{}({})", self.name, fields)
        }
    }
}

/// Check a table or index name.
///
/// Names end up inside storage keys, so they must not contain the key
/// separators `:` and `/`.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Validation(format!("{} name cannot be empty", kind)));
    }
    if name.contains(':') || name.contains('/') {
        return Err(Error::Validation(format!(
            "{} name '{}' cannot contain ':' or '/'",
            kind, name
        )));
    }
    Ok(())
}
