//! Storage layer
//!
//! # Architecture
//!
//! The engine sees storage as a flat, ordered keyspace:
//!
//! ```text
//! <table>:<id>                  record (JSON object)
//! <table>_<index>               whole index map (blob layout)
//! <table>_<index>/<composite>   one index entry (per-entry layout)
//! <table>_counter               auto-increment counter
//! ```
//!
//! Records of a table share the `<table>:` prefix; everything else lives
//! outside it so a record scan never observes index data.
//!
//! ## Backends
//!
//! The `KeyValueBackend` trait is the only seam the engine depends on:
//! - **MemoryBackend**: ordered in-memory map, atomic batches
//! - **JsonFileBackend**: whole-file JSON snapshot, atomic batches via rename

pub mod backend;
pub mod file;
pub mod memory;

pub use backend::{KeyValueBackend, WriteBatch, WriteOp};
pub use file::JsonFileBackend;
pub use memory::MemoryBackend;

/// Storage key of a record
pub fn record_key(table: &str, id: &impl std::fmt::Display) -> String {
    format!("{}:{}", table, id)
}

/// Prefix shared by every record of a table
pub fn record_prefix(table: &str) -> String {
    format!("{}:", table)
}

/// Storage key of the table's id counter
pub fn counter_key(table: &str) -> String {
    format!("{}_counter", table)
}
