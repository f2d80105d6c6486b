//! Dual-store consistency orchestration.
//!
//! `ChunkStore` keeps a TTL'd hash/list metadata store and a
//! position-addressed vector index consistent across upserts, soft deletes,
//! hard deletes, and query-driven deletes. There is no cross-store
//! transaction: every multi-step write stages its work, compensates on
//! failure, and verifies counts afterwards; the orphan reconciler closes
//! whatever a crash or late failure left behind.

pub mod compensate;
pub mod delete;
pub mod fetch;
pub mod keys;
pub mod mapping;
pub mod query;
pub mod reconcile;
pub mod store;
pub mod upsert;

pub use query::DeleteMode;
pub use store::{ChunkStore, ChunkStoreBuilder};

pub use chunkstore_types::{
    ChunkStoreError, FieldValue, Record, SearchCriteria, SearchHit, SkippedRecord, StoreConfig,
    UpsertItem, UpsertReport,
};
