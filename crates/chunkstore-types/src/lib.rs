//! Shared types for the chunkstore workspace.
//!
//! Defines the record model and its stored (flattened) form, the unified
//! error taxonomy, search criteria, batch reports, and configuration.

pub mod batch;
pub mod config;
pub mod error;
pub mod query;
pub mod record;

pub use batch::{SkippedRecord, UpsertReport};
pub use config::StoreConfig;
pub use error::ChunkStoreError;
pub use query::{IndexKind, SearchCriteria, SearchHit};
pub use record::{FieldValue, FlatRecord, Record, UpsertItem};
