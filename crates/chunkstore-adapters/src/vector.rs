//! Vector index trait and types.

use async_trait::async_trait;

use crate::error::BackendError;

/// Index statistics.
#[derive(Debug, Clone, Default)]
pub struct IndexInfo {
    /// Number of vectors currently in the index.
    pub total_vectors: usize,
    /// Embedding dimension, once the first vector has been added.
    pub dimension: Option<usize>,
}

/// Position-addressed ANN store.
///
/// Positions form a dense `[0, count)` range: adding appends at the tail,
/// and deletion compacts the range, shifting every position above a removed
/// slot down by one. Callers removing several positions in one call must
/// therefore hand them over sorted high-to-low so not-yet-processed
/// positions stay valid.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Append vectors, returning the position assigned to each in order.
    async fn add_vectors(&self, vectors: &[Vec<f32>]) -> Result<Vec<u64>, BackendError>;

    /// Remove the given positions. Returns how many were removed.
    async fn delete_vectors(&self, positions: &[u64]) -> Result<usize, BackendError>;

    /// Number of vectors in the index.
    async fn count(&self) -> Result<usize, BackendError>;

    /// Index statistics.
    async fn info(&self) -> Result<IndexInfo, BackendError>;
}
