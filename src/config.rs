//! Engine configuration
//!
//! Loaded in three layers, later ones winning:
//!
//! 1. built-in defaults
//! 2. an optional TOML file
//! 3. `DOCSTORE__*` environment variables (e.g. `DOCSTORE__INDEX_LAYOUT=per_entry`)
//!
//! ```toml
//! id_strategy = "counter"
//! comparison_policy = "fail_closed"
//! index_layout = "blob"
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How `create` obtains an id when the caller supplies none
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// Next value of the table's `<table>_counter`, stored as a string
    #[default]
    Counter,
    /// Random UUIDv4
    Uuid,
    /// Reject records without an id
    Required,
}

/// How `$gt`/`$gte`/`$lt`/`$lte` treat operands that are not both numbers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonPolicy {
    /// The condition is skipped (the record still matches)
    FailOpen,
    /// The condition fails (the record does not match)
    #[default]
    FailClosed,
}

/// Physical layout of secondary indexes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexLayout {
    /// One value per index holding the whole map
    #[default]
    Blob,
    /// One key per index entry
    PerEntry,
}

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub id_strategy: IdStrategy,
    pub comparison_policy: ComparisonPolicy,
    pub index_layout: IndexLayout,
}

impl StoreConfig {
    /// Load defaults, then `path` (if given), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            builder = builder.add_source(
                ::config::File::from(path).format(::config::FileFormat::Toml),
            );
        }

        let settings = builder
            .add_source(::config::Environment::with_prefix("DOCSTORE").prefix_separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Parse a TOML document directly
    pub fn from_toml(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| Error::Config(e.to_string()))
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn with_id_strategy(mut self, id_strategy: IdStrategy) -> Self {
        self.id_strategy = id_strategy;
        self
    }

    pub fn with_comparison_policy(mut self, comparison_policy: ComparisonPolicy) -> Self {
        self.comparison_policy = comparison_policy;
        self
    }

    pub fn with_index_layout(mut self, index_layout: IndexLayout) -> Self {
        self.index_layout = index_layout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.id_strategy, IdStrategy::Counter);
        assert_eq!(config.comparison_policy, ComparisonPolicy::FailClosed);
        assert_eq!(config.index_layout, IndexLayout::Blob);
    }

    #[test]
    fn test_toml_round_trip_with_partial_file() {
        let config = StoreConfig::from_toml("index_layout = \"per_entry\"\n").unwrap();
        assert_eq!(config.index_layout, IndexLayout::PerEntry);
        assert_eq!(config.id_strategy, IdStrategy::Counter);

        let rendered = config.to_toml().unwrap();
        assert_eq!(StoreConfig::from_toml(&rendered).unwrap(), config);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docstore.toml");
        std::fs::write(
            &path,
            "id_strategy = \"uuid\"\ncomparison_policy = \"fail_open\"\n",
        )
        .unwrap();

        let config = StoreConfig::load(Some(&path)).unwrap();
        assert_eq!(config.id_strategy, IdStrategy::Uuid);
        assert_eq!(config.comparison_policy, ComparisonPolicy::FailOpen);
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        let result = StoreConfig::load(Some(Path::new("/nonexistent/docstore.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
