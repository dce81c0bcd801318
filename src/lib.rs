// docstore - Embedded document store
// Typed records, secondary indexes and queries over an ordered key-value backend

#![warn(rust_2018_idioms)]

pub mod config;
pub mod index;
pub mod model;
pub mod query;
pub mod record;
pub mod storage;

// Re-exports for convenience
pub use config::{ComparisonPolicy, IdStrategy, IndexLayout, StoreConfig};
pub use index::{IndexDefinition, IndexMaintainer, IndexOp};
pub use model::{DocumentModel, ModelRegistry};
pub use query::{IncludeOptions, QueryOptions, SortDirection, SortKey};
pub use record::{Datum, FieldType, Record, RecordId, TableSchema};
pub use storage::{JsonFileBackend, KeyValueBackend, MemoryBackend, WriteBatch, WriteOp};

/// docstore error types
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Storage error: {0}")]
        Storage(String),

        #[error("Not found: {0}")]
        NotFound(String),

        #[error("Already exists: {0}")]
        AlreadyExists(String),

        #[error("Index violation: {index} must be unique (value: {value})")]
        IndexViolation { index: String, value: String },

        #[error("Validation error: {0}")]
        Validation(String),

        #[error("Serialization error: {0}")]
        Serialization(String),

        #[error("Configuration error: {0}")]
        Config(String),
    }

    impl Error {
        /// Protocol status a request router should surface for this error.
        pub fn status_code(&self) -> u16 {
            match self {
                Error::NotFound(_) => 404,
                Error::Validation(_) | Error::AlreadyExists(_) => 400,
                Error::IndexViolation { .. } => 409,
                Error::Storage(_) | Error::Serialization(_) | Error::Config(_) => 500,
            }
        }
    }

    impl From<serde_json::Error> for Error {
        fn from(e: serde_json::Error) -> Self {
            Error::Serialization(e.to_string())
        }
    }

    impl From<config::ConfigError> for Error {
        fn from(e: config::ConfigError) -> Self {
            Error::Config(e.to_string())
        }
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::error::Error;

    #[test]
    fn test_status_codes_follow_error_kind() {
        assert_eq!(Error::NotFound("notes:1".into()).status_code(), 404);
        assert_eq!(Error::Validation("bad id".into()).status_code(), 400);
        assert_eq!(Error::AlreadyExists("notes:1".into()).status_code(), 400);
        let violation = Error::IndexViolation {
            index: "email_idx".into(),
            value: "a@b.c".into(),
        };
        assert_eq!(violation.status_code(), 409);
        assert_eq!(
            violation.to_string(),
            "Index violation: email_idx must be unique (value: a@b.c)"
        );
    }
}
