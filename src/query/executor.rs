//! Query executor.
//!
//! Evaluates compiled queries over a materialized set of records.
//!
//! # Comparison operators
//!
//! `$gt`, `$gte`, `$lt` and `$lte` only compare numbers. When the field value
//! or the operand is not a number the outcome is decided by the configured
//! [`ComparisonPolicy`]. `$ne`, `$in` and `$nin` use plain value equality on
//! any type. A field missing from the record never equals anything.

use super::{FieldFilter, Filter, Operator, QueryOptions, SortDirection, SortKey};
use crate::config::ComparisonPolicy;
use crate::record::{Datum, Record};
use std::cmp::Ordering;
use tracing::debug;

/// Filter, sort and paginate records in memory
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryExecutor {
    policy: ComparisonPolicy,
}

impl QueryExecutor {
    pub fn new(policy: ComparisonPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ComparisonPolicy {
        self.policy
    }

    /// Run `options` (minus `include`) over `records`
    pub fn run(&self, records: Vec<Record>, options: &QueryOptions) -> Vec<Record> {
        self.evaluate(
            records,
            &options.filter,
            &options.order_by,
            options.limit,
            options.offset,
        )
    }

    pub fn evaluate(
        &self,
        records: Vec<Record>,
        filter: &Filter,
        order_by: &[SortKey],
        limit: Option<usize>,
        offset: usize,
    ) -> Vec<Record> {
        let scanned = records.len();
        let mut results: Vec<Record> = records
            .into_iter()
            .filter(|record| self.matches(record, filter))
            .collect();

        if !order_by.is_empty() {
            results = sort_records(results, order_by);
        }

        let results: Vec<Record> = match limit {
            Some(limit) => results.into_iter().skip(offset).take(limit).collect(),
            None => results.into_iter().skip(offset).collect(),
        };

        debug!(scanned, returned = results.len(), "Evaluated query");
        results
    }

    /// Whether `record` satisfies every condition of `filter`
    pub fn matches(&self, record: &Record, filter: &Filter) -> bool {
        filter
            .conditions()
            .iter()
            .all(|(field, condition)| match condition {
                FieldFilter::Equals(expected) => record.get(field) == Some(expected),
                FieldFilter::Operators(operators) => operators
                    .iter()
                    .all(|operator| self.holds(record.get(field), operator)),
            })
    }

    fn holds(&self, value: Option<&Datum>, operator: &Operator) -> bool {
        match operator {
            Operator::Gt(operand) => self.numeric(value, operand, |a, b| a > b),
            Operator::Gte(operand) => self.numeric(value, operand, |a, b| a >= b),
            Operator::Lt(operand) => self.numeric(value, operand, |a, b| a < b),
            Operator::Lte(operand) => self.numeric(value, operand, |a, b| a <= b),
            Operator::Ne(operand) => value != Some(operand),
            Operator::In(items) => value.map_or(false, |v| items.contains(v)),
            Operator::Nin(items) => value.map_or(true, |v| !items.contains(v)),
        }
    }

    fn numeric(&self, value: Option<&Datum>, operand: &Datum, cmp: impl Fn(f64, f64) -> bool) -> bool {
        match (value.and_then(Datum::as_number), operand.as_number()) {
            (Some(a), Some(b)) => cmp(a, b),
            _ => self.policy == ComparisonPolicy::FailOpen,
        }
    }
}

fn compare_records(a: &Record, b: &Record, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let ordering = match (a.get(&key.column), b.get(&key.column)) {
            (Some(x), Some(y)) => x.compare(y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        };
        let ordering = match key.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Stable merge sort by `keys`.
///
/// Mixed-type columns make the comparison non-transitive, which the std sorts
/// are allowed to panic on, so records are merged by hand.
fn sort_records(records: Vec<Record>, keys: &[SortKey]) -> Vec<Record> {
    if records.len() <= 1 {
        return records;
    }

    let mut left = records;
    let right = left.split_off(left.len() / 2);
    let left = sort_records(left, keys);
    let right = sort_records(right, keys);

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(a), Some(b)) = (left.peek(), right.peek()) {
        // Equal keys keep the left (earlier) record first.
        let take_right = compare_records(b, a, keys) == Ordering::Less;
        merged.extend(if take_right { right.next() } else { left.next() });
    }
    merged.extend(left);
    merged.extend(right);
    merged
}
