//! Datum - the JSON-like value stored in record fields.
//!
//! A `Datum` represents any value a record field can hold. Records are
//! expected to carry scalars (or null); arrays and objects are tolerated so
//! eager-loaded relations can be attached to query results.
//!
//! # Supported Types
//!
//! - **Null**: Absence of a value
//! - **Boolean**: true or false
//! - **Number**: f64 floating point numbers
//! - **String**: UTF-8 encoded text
//! - **Array**: Ordered list of datums
//! - **Object**: Key-value map (like JSON object)
//!
//! # Example
//!
//! ```rust
//! use docstore::Datum;
//!
//! let null_val = Datum::Null;
//! let num_val = Datum::from(42);
//! let str_val = Datum::from("hello");
//! assert!(null_val.is_null());
//! assert_eq!(num_val.as_number(), Some(42.0));
//! assert_eq!(str_val.as_string(), Some("hello"));
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Datum represents a single field value.
///
/// JSON-compatible through serde; `untagged` keeps the stored form identical
/// to plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Datum {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Array(Vec<Datum>),
    Object(BTreeMap<String, Datum>),
}

impl Datum {
    /// Check if datum is null
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Get as string
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Datum::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Datum::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as an integer, only when the number has no fractional part
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
            _ => None,
        }
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Datum::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as array
    pub fn as_array(&self) -> Option<&Vec<Datum>> {
        match self {
            Datum::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Get as object
    pub fn as_object(&self) -> Option<&BTreeMap<String, Datum>> {
        match self {
            Datum::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Type name used in validation messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Datum::Null => "null",
            Datum::Boolean(_) => "boolean",
            Datum::Number(_) => "number",
            Datum::String(_) => "string",
            Datum::Array(_) => "array",
            Datum::Object(_) => "object",
        }
    }

    /// Ordering used by `orderBy`.
    ///
    /// Only values of the same scalar type are ordered. Every other pair
    /// (including a missing field against anything) is incomparable and the
    /// caller treats it as a tie.
    pub fn compare(&self, other: &Datum) -> Option<Ordering> {
        match (self, other) {
            (Datum::Number(a), Datum::Number(b)) => a.partial_cmp(b),
            (Datum::String(a), Datum::String(b)) => Some(a.cmp(b)),
            (Datum::Boolean(a), Datum::Boolean(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Render a value as one segment of an index composite key.
    ///
    /// Null renders as the empty string, same as a missing field.
    pub fn key_segment(&self) -> String {
        match self {
            Datum::Null => String::new(),
            Datum::Boolean(b) => b.to_string(),
            Datum::Number(n) => n.to_string(),
            Datum::String(s) => s.clone(),
            Datum::Array(_) | Datum::Object(_) => self.to_string(),
        }
    }
}

// Conversions
impl From<bool> for Datum {
    fn from(b: bool) -> Self {
        Datum::Boolean(b)
    }
}

impl From<i32> for Datum {
    fn from(n: i32) -> Self {
        Datum::Number(n as f64)
    }
}

impl From<i64> for Datum {
    fn from(n: i64) -> Self {
        Datum::Number(n as f64)
    }
}

impl From<f64> for Datum {
    fn from(n: f64) -> Self {
        Datum::Number(n)
    }
}

impl From<String> for Datum {
    fn from(s: String) -> Self {
        Datum::String(s)
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Datum::String(s.to_string())
    }
}

impl<T: Into<Datum>> From<Option<T>> for Datum {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Datum::Null)
    }
}

impl From<serde_json::Value> for Datum {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Datum::Null,
            serde_json::Value::Bool(b) => Datum::Boolean(b),
            serde_json::Value::Number(n) => Datum::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Datum::String(s),
            serde_json::Value::Array(arr) => {
                Datum::Array(arr.into_iter().map(Datum::from).collect())
            }
            serde_json::Value::Object(obj) => {
                Datum::Object(obj.into_iter().map(|(k, v)| (k, Datum::from(v))).collect())
            }
        }
    }
}

impl From<Datum> for serde_json::Value {
    fn from(datum: Datum) -> Self {
        match datum {
            Datum::Null => serde_json::Value::Null,
            Datum::Boolean(b) => serde_json::Value::Bool(b),
            Datum::Number(n) => {
                // Integral numbers go back out as JSON integers so ids and
                // timestamps survive a round trip through typed structs.
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    serde_json::Value::from(n as i64)
                } else {
                    serde_json::Number::from_f64(n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            Datum::String(s) => serde_json::Value::String(s),
            Datum::Array(arr) => {
                serde_json::Value::Array(arr.into_iter().map(serde_json::Value::from).collect())
            }
            Datum::Object(obj) => serde_json::Value::Object(
                obj.into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl std::fmt::Display for Datum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Datum::Null => write!(f, "null"),
            Datum::Boolean(b) => write!(f, "{}", b),
            Datum::Number(n) => write!(f, "{}", n),
            Datum::String(s) => write!(f, "\"{}\"", s),
            Datum::Array(arr) => {
                write!(f, "[")?;
                for (i, item) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Datum::Object(obj) => {
                write!(f, "{{")?;
                for (i, (key, value)) in obj.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{}\": {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_only_orders_same_types() {
        assert_eq!(Datum::from(1).compare(&Datum::from(2)), Some(Ordering::Less));
        assert_eq!(
            Datum::from("b").compare(&Datum::from("a")),
            Some(Ordering::Greater)
        );
        assert_eq!(Datum::from(1).compare(&Datum::from("1")), None);
        assert_eq!(Datum::Null.compare(&Datum::from(3)), None);
    }

    #[test]
    fn test_key_segment_rendering() {
        assert_eq!(Datum::Null.key_segment(), "");
        assert_eq!(Datum::from(42).key_segment(), "42");
        assert_eq!(Datum::from(1.5).key_segment(), "1.5");
        assert_eq!(Datum::from("alice").key_segment(), "alice");
        assert_eq!(Datum::from(true).key_segment(), "true");
    }

    #[test]
    fn test_integral_numbers_serialize_as_integers() {
        let value = serde_json::Value::from(Datum::from(1_700_000_000_000_i64));
        assert_eq!(value, serde_json::json!(1_700_000_000_000_i64));
        assert!(value.is_i64());

        let value = serde_json::Value::from(Datum::from(2.5));
        assert_eq!(value, serde_json::json!(2.5));
    }
}
