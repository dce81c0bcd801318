//! Record identifiers.

use super::Datum;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Primary key of a record: a string or an integral number.
///
/// Both forms render to the same storage key segment, so `RecordId::from(7)`
/// and `RecordId::from("7")` address the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Number(i64),
    String(String),
}

impl RecordId {
    /// Convert a field value into an id.
    ///
    /// Accepts non-empty strings and integral numbers.
    pub fn from_datum(value: &Datum) -> Result<Self> {
        match value {
            Datum::String(s) if !s.is_empty() => Ok(RecordId::String(s.clone())),
            Datum::Number(_) => value.as_i64().map(RecordId::Number).ok_or_else(|| {
                Error::Validation(format!("id must be an integral number, got {}", value))
            }),
            other => Err(Error::Validation(format!(
                "id must be a non-empty string or a number, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn to_datum(&self) -> Datum {
        match self {
            RecordId::Number(n) => Datum::from(*n),
            RecordId::String(s) => Datum::String(s.clone()),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Number(n) => write!(f, "{}", n),
            RecordId::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::String(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId::String(s)
    }
}

impl From<i64> for RecordId {
    fn from(n: i64) -> Self {
        RecordId::Number(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_datum_accepts_strings_and_integers() {
        assert_eq!(
            RecordId::from_datum(&Datum::from("n1")).unwrap(),
            RecordId::from("n1")
        );
        assert_eq!(
            RecordId::from_datum(&Datum::from(12)).unwrap(),
            RecordId::from(12)
        );
    }

    #[test]
    fn test_from_datum_rejects_bad_ids() {
        assert!(RecordId::from_datum(&Datum::from("")).is_err());
        assert!(RecordId::from_datum(&Datum::from(1.5)).is_err());
        assert!(RecordId::from_datum(&Datum::Null).is_err());
        assert!(RecordId::from_datum(&Datum::from(true)).is_err());
    }

    #[test]
    fn test_display_matches_storage_segment() {
        assert_eq!(RecordId::from(7).to_string(), "7");
        assert_eq!(RecordId::from("7").to_string(), "7");
    }
}
