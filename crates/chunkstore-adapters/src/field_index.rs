//! Secondary field-index manager trait.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use chunkstore_types::{FieldValue, IndexKind, SearchCriteria, SearchHit};

use crate::error::BackendError;

/// Structured/text/vector search over record fields.
///
/// The matching algorithm is backend-internal; the consistency layer only
/// keeps the set of indexes in step with the fields it stores and the set
/// of indexed documents in step with the records that exist.
#[async_trait]
pub trait FieldIndexManager: Send + Sync {
    /// Create an index for `field` if one does not exist. Returns true when
    /// a new index was created.
    async fn ensure_index(&self, field: &str, kind: IndexKind) -> Result<bool, BackendError>;

    /// Drop the index for `field`. Returns true when it existed.
    async fn drop_index(&self, field: &str) -> Result<bool, BackendError>;

    /// Index (or re-index) a record's scalar fields and optional embedding.
    async fn index_record(
        &self,
        id: &str,
        fields: &HashMap<String, FieldValue>,
        embedding: Option<&[f32]>,
    ) -> Result<(), BackendError>;

    /// Remove a record from every index that referenced the given field
    /// snapshot.
    async fn remove_from_indexes(
        &self,
        id: &str,
        snapshot: &HashMap<String, FieldValue>,
    ) -> Result<(), BackendError>;

    /// Ranked search. `limit` of None means unbounded.
    async fn search(
        &self,
        criteria: &SearchCriteria,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<SearchHit>, BackendError>;

    /// Names of all currently indexed fields.
    async fn indexed_fields(&self) -> Result<HashSet<String>, BackendError>;

    /// Drop indexes that no longer reference any document. Returns the
    /// names dropped.
    async fn prune_empty(&self) -> Result<Vec<String>, BackendError>;
}
