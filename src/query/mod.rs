//! Query engine
//!
//! Queries run entirely in memory over the records of one table:
//!
//! 1. **Filter**: every condition of the `where` clause must hold (logical AND)
//! 2. **Sort**: stable multi-key sort, ties fall through to the next key
//! 3. **Paginate**: `offset` then `limit`, strictly after filtering and sorting
//!
//! No index is consulted; cost is proportional to table size.

pub mod compiler;
pub mod executor;

pub use compiler::QueryCompiler;
pub use executor::QueryExecutor;

use crate::error::{Error, Result};
use crate::record::Datum;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Operator condition on a single field
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Gt(Datum),
    Gte(Datum),
    Lt(Datum),
    Lte(Datum),
    Ne(Datum),
    In(Vec<Datum>),
    Nin(Vec<Datum>),
}

/// Condition on one field of a `where` clause
#[derive(Debug, Clone, PartialEq)]
pub enum FieldFilter {
    /// Literal equality
    Equals(Datum),
    /// Every operator must hold
    Operators(Vec<Operator>),
}

/// Compiled `where` clause
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, FieldFilter)>,
}

impl Filter {
    /// Empty filter, matches every record
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Datum>) -> Self {
        self.conditions
            .push((field.into(), FieldFilter::Equals(value.into())));
        self
    }

    pub fn op(self, field: impl Into<String>, operator: Operator) -> Self {
        self.with_operators(field, vec![operator])
    }

    pub fn with_operators(mut self, field: impl Into<String>, operators: Vec<Operator>) -> Self {
        self.conditions
            .push((field.into(), FieldFilter::Operators(operators)));
        self
    }

    pub fn conditions(&self) -> &[(String, FieldFilter)] {
        &self.conditions
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ASC" => Ok(SortDirection::Asc),
            "DESC" => Ok(SortDirection::Desc),
            other => Err(Error::Validation(format!(
                "sort direction must be ASC or DESC, got '{}'",
                other
            ))),
        }
    }
}

/// One `orderBy` key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortKey {
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }

    pub fn asc(column: impl Into<String>) -> Self {
        Self::new(column, SortDirection::Asc)
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self::new(column, SortDirection::Desc)
    }
}

/// Eager-load hint: attach records of `model` whose `foreign_key` equals this
/// record's `local_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludeOptions {
    pub model: String,
    pub foreign_key: String,
    #[serde(default = "default_local_key")]
    pub local_key: String,
    #[serde(rename = "as", default)]
    pub as_field: Option<String>,
}

fn default_local_key() -> String {
    crate::record::ID_FIELD.to_string()
}

impl IncludeOptions {
    pub fn new(model: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            foreign_key: foreign_key.into(),
            local_key: default_local_key(),
            as_field: None,
        }
    }

    pub fn local_key(mut self, local_key: impl Into<String>) -> Self {
        self.local_key = local_key.into();
        self
    }

    pub fn as_field(mut self, field: impl Into<String>) -> Self {
        self.as_field = Some(field.into());
        self
    }

    /// Field the related records are attached under
    pub fn target_field(&self) -> &str {
        self.as_field.as_deref().unwrap_or(&self.model)
    }
}

/// Options of `find_all` and friends.
///
/// # Example
///
/// ```rust
/// use docstore::query::{Filter, Operator, QueryOptions, SortKey};
///
/// let options = QueryOptions::new()
///     .filter(Filter::new().op("age", Operator::Gte(18.into())))
///     .order_by(SortKey::desc("age"))
///     .limit(2);
/// assert_eq!(options.limit, Some(2));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub filter: Filter,
    pub order_by: Vec<SortKey>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub include: Vec<IncludeOptions>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the JSON query format (see [`QueryCompiler`])
    pub fn from_json(query: &serde_json::Value) -> Result<Self> {
        QueryCompiler::compile(query)
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn order_by(mut self, key: SortKey) -> Self {
        self.order_by.push(key);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn include(mut self, include: IncludeOptions) -> Self {
        self.include.push(include);
        self
    }
}

impl From<Filter> for QueryOptions {
    fn from(filter: Filter) -> Self {
        Self::new().filter(filter)
    }
}
