//! Optional per-table field schema, checked before anything is written.

use super::{Datum, Record, CREATED_FIELD, ID_FIELD, MODIFIED_FIELD};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declared type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    /// Milliseconds since the Unix epoch
    Timestamp,
    Any,
}

impl FieldType {
    fn accepts(&self, value: &Datum) -> bool {
        match self {
            FieldType::String => matches!(value, Datum::String(_)),
            FieldType::Number => matches!(value, Datum::Number(_)),
            FieldType::Boolean => matches!(value, Datum::Boolean(_)),
            FieldType::Timestamp => value.as_i64().is_some(),
            FieldType::Any => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub ty: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl FieldSpec {
    pub fn new(ty: FieldType) -> Self {
        Self {
            ty,
            required: false,
            nullable: true,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Field schema for one table.
///
/// With `strict` set, fields not declared here are rejected. The engine
/// managed fields (`id`, `created`, `modified`) are always allowed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub fields: BTreeMap<String, FieldSpec>,
    #[serde(default)]
    pub strict: bool,
}

impl TableSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Validate a full record about to be created.
    pub fn validate_record(&self, record: &Record) -> Result<()> {
        for (name, spec) in &self.fields {
            if spec.required && record.get(name).map_or(true, Datum::is_null) {
                return Err(Error::Validation(format!("missing required field '{}'", name)));
            }
        }
        self.validate_patch(record)
    }

    /// Validate the fields present in a patch.
    pub fn validate_patch(&self, patch: &Record) -> Result<()> {
        for (name, value) in patch.fields() {
            if is_engine_field(name) {
                continue;
            }
            match self.fields.get(name) {
                Some(spec) if value.is_null() => {
                    if !spec.nullable {
                        return Err(Error::Validation(format!("field '{}' cannot be null", name)));
                    }
                }
                Some(spec) => {
                    if !spec.ty.accepts(value) {
                        return Err(Error::Validation(format!(
                            "field '{}' expects {:?}, got {}",
                            name,
                            spec.ty,
                            value.type_name()
                        )));
                    }
                }
                None if self.strict => {
                    return Err(Error::Validation(format!("unknown field '{}'", name)));
                }
                None => {}
            }
        }
        Ok(())
    }
}

fn is_engine_field(name: &str) -> bool {
    name == ID_FIELD || name == CREATED_FIELD || name == MODIFIED_FIELD
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableSchema {
        TableSchema::new()
            .field("email", FieldSpec::new(FieldType::String).required())
            .field("age", FieldSpec::new(FieldType::Number))
            .strict()
    }

    #[test]
    fn test_required_field_missing() {
        let err = users()
            .validate_record(&Record::new().with("id", "u1"))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_type_mismatch_and_unknown_field() {
        let schema = users();
        let bad_type = Record::new().with("email", "a@b.c").with("age", "old");
        assert!(schema.validate_record(&bad_type).is_err());

        let unknown = Record::new().with("email", "a@b.c").with("nickname", "al");
        assert!(schema.validate_record(&unknown).is_err());

        let ok = Record::new()
            .with("id", "u1")
            .with("email", "a@b.c")
            .with("age", Datum::Null);
        assert!(schema.validate_record(&ok).is_ok());
    }

    #[test]
    fn test_patch_cannot_null_required_field() {
        let patch = Record::new().with("email", Datum::Null);
        assert!(users().validate_patch(&patch).is_err());
    }
}
