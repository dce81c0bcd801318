//! Query compiler.
//!
//! Compiles the JSON query format into typed [`Filter`] and [`SortKey`]
//! values before anything is evaluated.
//!
//! # Format
//!
//! ```json
//! {
//!   "where":   { "archived": true, "age": { "$gte": 18, "$lt": 65 } },
//!   "orderBy": [ { "column": "age", "direction": "DESC" } ],
//!   "limit":   10,
//!   "offset":  20
//! }
//! ```
//!
//! A `where` entry is either a literal (equality) or an operator object with
//! keys among `$gt`, `$gte`, `$lt`, `$lte`, `$ne`, `$in` and `$nin`. Arrays are
//! literals. `orderBy` accepts a single object or an array of them.

use super::{Filter, IncludeOptions, Operator, QueryOptions, SortDirection, SortKey};
use crate::error::{Error, Result};
use crate::record::Datum;
use serde_json::Value;
use std::collections::BTreeMap;

/// Compiler for the JSON query format
pub struct QueryCompiler;

impl QueryCompiler {
    /// Compile a full query object
    pub fn compile(query: &Value) -> Result<QueryOptions> {
        let obj = match query {
            Value::Null => return Ok(QueryOptions::default()),
            Value::Object(obj) => obj,
            other => {
                return Err(Error::Validation(format!(
                    "query must be an object, got {}",
                    other
                )))
            }
        };

        let mut options = QueryOptions::default();
        for (key, value) in obj {
            match key.as_str() {
                "where" => options.filter = Self::compile_where(value)?,
                "orderBy" => options.order_by = Self::compile_order_by(value)?,
                "limit" => options.limit = Self::compile_count("limit", value)?,
                "offset" => {
                    options.offset = Self::compile_count("offset", value)?.unwrap_or(0)
                }
                "include" => options.include = Self::compile_include(value)?,
                other => {
                    return Err(Error::Validation(format!("unknown query option '{}'", other)))
                }
            }
        }
        Ok(options)
    }

    /// Compile a `where` object
    pub fn compile_where(value: &Value) -> Result<Filter> {
        match Datum::from(value.clone()) {
            Datum::Null => Ok(Filter::new()),
            Datum::Object(fields) => Self::compile_filter(fields),
            other => Err(Error::Validation(format!(
                "where must be an object, got {}",
                other.type_name()
            ))),
        }
    }

    /// Compile `where` conditions already held as datums
    pub fn compile_filter(fields: BTreeMap<String, Datum>) -> Result<Filter> {
        let mut filter = Filter::new();
        for (field, condition) in fields {
            filter = match condition {
                Datum::Object(ops) => {
                    let operators = ops
                        .into_iter()
                        .map(|(op, operand)| Self::compile_operator(&field, &op, operand))
                        .collect::<Result<Vec<_>>>()?;
                    filter.with_operators(field, operators)
                }
                literal => filter.eq(field, literal),
            };
        }
        Ok(filter)
    }

    fn compile_operator(field: &str, op: &str, operand: Datum) -> Result<Operator> {
        let sequence = |operand: Datum| match operand {
            Datum::Array(items) => Ok(items),
            other => Err(Error::Validation(format!(
                "{} on '{}' requires an array, got {}",
                op,
                field,
                other.type_name()
            ))),
        };

        match op {
            "$gt" => Ok(Operator::Gt(operand)),
            "$gte" => Ok(Operator::Gte(operand)),
            "$lt" => Ok(Operator::Lt(operand)),
            "$lte" => Ok(Operator::Lte(operand)),
            "$ne" => Ok(Operator::Ne(operand)),
            "$in" => Ok(Operator::In(sequence(operand)?)),
            "$nin" => Ok(Operator::Nin(sequence(operand)?)),
            other => Err(Error::Validation(format!(
                "unknown operator '{}' on '{}'",
                other, field
            ))),
        }
    }

    /// Compile `orderBy`: one sort object or an array of them
    pub fn compile_order_by(value: &Value) -> Result<Vec<SortKey>> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Array(keys) => keys.iter().map(Self::compile_sort_key).collect(),
            single => Ok(vec![Self::compile_sort_key(single)?]),
        }
    }

    fn compile_sort_key(value: &Value) -> Result<SortKey> {
        let column = value
            .get("column")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("orderBy entry requires a 'column'".to_string()))?;

        let direction = match value.get("direction") {
            None | Some(Value::Null) => SortDirection::Asc,
            Some(Value::String(d)) => d.parse()?,
            Some(other) => {
                return Err(Error::Validation(format!(
                    "orderBy direction must be a string, got {}",
                    other
                )))
            }
        };

        Ok(SortKey::new(column, direction))
    }

    fn compile_count(name: &str, value: &Value) -> Result<Option<usize>> {
        match value {
            Value::Null => Ok(None),
            Value::Number(n) => n
                .as_u64()
                .map(|n| Some(n as usize))
                .ok_or_else(|| Error::Validation(format!("{} must be a non-negative integer", name))),
            other => Err(Error::Validation(format!(
                "{} must be a non-negative integer, got {}",
                name, other
            ))),
        }
    }

    fn compile_include(value: &Value) -> Result<Vec<IncludeOptions>> {
        let parse = |v: &Value| {
            serde_json::from_value::<IncludeOptions>(v.clone())
                .map_err(|e| Error::Validation(format!("invalid include: {}", e)))
        };
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items.iter().map(parse).collect(),
            single => Ok(vec![parse(single)?]),
        }
    }
}
