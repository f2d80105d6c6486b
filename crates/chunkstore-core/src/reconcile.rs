//! Orphan vector reconciliation.
//!
//! A position is orphaned when its binding is missing or names a record
//! that no longer exists. Soft-deleted records keep their vectors and are
//! not orphans. Reconciliation removes orphaned slots, drops their
//! bindings, and shifts the surviving bindings over the compacted range,
//! restoring the two-way position↔record mapping after a partial failure
//! or an external crash.

use tracing::{debug, info};

use chunkstore_adapters::{PipelineOp, PipelineResult};
use chunkstore_types::ChunkStoreError;

use crate::keys;
use crate::store::ChunkStore;

impl ChunkStore {
    /// Remove vector index entries with no live metadata counterpart.
    /// Returns the number of orphaned positions removed. Idempotent: an
    /// immediate second run finds nothing.
    pub async fn clean_orphan_vectors(&self) -> Result<usize, ChunkStoreError> {
        let vectors = self.require_vectors()?.clone();
        let total = vectors
            .count()
            .await
            .map_err(|e| ChunkStoreError::index_op("count", e))?;
        if total == 0 {
            debug!("Vector index is empty, nothing to reconcile");
            return Ok(0);
        }

        let page = self.config.scan_page_size.max(1);
        let mut orphans: Vec<u64> = Vec::new();
        let mut start = 0usize;
        while start < total {
            let end = (start + page).min(total);
            let positions: Vec<u64> = (start as u64..end as u64).collect();

            // Resolve bindings for this page in one round trip.
            let bind_ops: Vec<PipelineOp> = positions
                .iter()
                .map(|p| PipelineOp::HashGet {
                    key: keys::position_key(*p),
                    field: "id".to_string(),
                })
                .collect();
            let bindings = self
                .store
                .pipeline(bind_ops)
                .await
                .map_err(|e| ChunkStoreError::store_op("pipeline", e))?;

            // Check record existence for the bound ids in a second round
            // trip; unbound positions are orphans outright.
            let mut bound: Vec<(u64, String)> = Vec::new();
            for (position, result) in positions.iter().zip(bindings) {
                match result {
                    PipelineResult::Value(Some(id)) => bound.push((*position, id)),
                    _ => orphans.push(*position),
                }
            }

            if !bound.is_empty() {
                let exist_ops: Vec<PipelineOp> = bound
                    .iter()
                    .map(|(_, id)| PipelineOp::Exists {
                        key: keys::record_key(id),
                    })
                    .collect();
                let existence = self
                    .store
                    .pipeline(exist_ops)
                    .await
                    .map_err(|e| ChunkStoreError::store_op("pipeline", e))?;
                for ((position, id), exists) in bound.into_iter().zip(existence) {
                    if !exists.into_bool() {
                        debug!(position, id = %id, "Binding references a dead record");
                        orphans.push(position);
                    }
                }
            }

            start = end;
        }

        if orphans.is_empty() {
            info!(total, "No orphan vectors found");
            return Ok(0);
        }

        // Remove high-to-low in one call, then drop the bindings and shift
        // the survivors over the compacted slots.
        orphans.sort_unstable();
        orphans.dedup();
        let mut descending = orphans.clone();
        descending.reverse();

        let removed = vectors
            .delete_vectors(&descending)
            .await
            .map_err(|e| ChunkStoreError::index_op("delete_vectors", e))?;

        let unbind = self.positions.stage_unbind(&orphans);
        self.store
            .pipeline(unbind)
            .await
            .map_err(|e| ChunkStoreError::store_op("pipeline", e))?;

        self.rebind_after_removal(&orphans).await?;

        info!(removed, "Removed orphan vectors");
        Ok(removed)
    }
}
