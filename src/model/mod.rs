//! Document models
//!
//! A [`DocumentModel`] is the CRUD surface of one table. A [`ModelRegistry`]
//! hands out one shared model per table so that every caller goes through the
//! same write lock and id clock.

pub mod document;
pub mod registry;

pub use document::DocumentModel;
pub use registry::ModelRegistry;
