//! In-memory vector index.
//!
//! Flat storage with the dense-position contract of `VectorIndex`: append
//! assigns the next position, deletion compacts and shifts higher positions
//! down, exactly like a flat ANN index.

use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use crate::error::BackendError;
use crate::vector::{IndexInfo, VectorIndex};

/// In-memory `VectorIndex`.
#[derive(Default)]
pub struct MemoryVectorIndex {
    vectors: RwLock<Vec<Vec<f32>>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a vector back by position. Test helper, not part of the trait.
    pub fn vector_at(&self, position: u64) -> Option<Vec<f32>> {
        let vectors = self.vectors.read().unwrap();
        vectors.get(position as usize).cloned()
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn add_vectors(&self, new: &[Vec<f32>]) -> Result<Vec<u64>, BackendError> {
        if new.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = self.vectors.write().unwrap();
        let expected = vectors.first().map(Vec::len).unwrap_or(new[0].len());
        for vector in new {
            if vector.len() != expected {
                return Err(BackendError::Dimension {
                    expected,
                    got: vector.len(),
                });
            }
        }

        let start = vectors.len() as u64;
        vectors.extend(new.iter().cloned());
        let positions: Vec<u64> = (start..start + new.len() as u64).collect();
        debug!(added = new.len(), total = vectors.len(), "Added vectors");
        Ok(positions)
    }

    async fn delete_vectors(&self, positions: &[u64]) -> Result<usize, BackendError> {
        let mut vectors = self.vectors.write().unwrap();

        // Process high-to-low regardless of caller order so earlier removals
        // cannot invalidate later ones within this call.
        let mut sorted: Vec<u64> = positions.to_vec();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        sorted.dedup();

        let mut removed = 0;
        for position in sorted {
            let index = position as usize;
            if index < vectors.len() {
                vectors.remove(index);
                removed += 1;
            }
        }
        debug!(removed, total = vectors.len(), "Removed vectors");
        Ok(removed)
    }

    async fn count(&self) -> Result<usize, BackendError> {
        Ok(self.vectors.read().unwrap().len())
    }

    async fn info(&self) -> Result<IndexInfo, BackendError> {
        let vectors = self.vectors.read().unwrap();
        Ok(IndexInfo {
            total_vectors: vectors.len(),
            dimension: vectors.first().map(Vec::len),
        })
    }
}
