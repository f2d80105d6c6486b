//! Index-position mapping layer.
//!
//! Binds vector index positions to record ids in both directions:
//! `index_pos:{position}` holds the id, and the record hash holds
//! `index_position`. A raw copy of each vector is kept at
//! `embedding:{id}` so embeddings survive independently of the index.

use std::collections::HashMap;
use std::sync::Arc;

use chunkstore_adapters::{MetadataStore, PipelineOp};
use chunkstore_types::ChunkStoreError;

use crate::keys;

/// Position↔id bindings over the metadata store.
#[derive(Clone)]
pub struct PositionMap {
    store: Arc<dyn MetadataStore>,
    ttl_seconds: u64,
}

impl PositionMap {
    pub fn new(store: Arc<dyn MetadataStore>, ttl_seconds: u64) -> Self {
        Self { store, ttl_seconds }
    }

    /// Pipeline ops binding `id` to `position` and backing up the raw
    /// vector. The position binding carries no TTL; reconciliation owns its
    /// lifecycle.
    pub fn stage_bind(&self, id: &str, position: u64, embedding: &[f32]) -> Vec<PipelineOp> {
        let mut ops = Vec::with_capacity(4);

        let mut binding = HashMap::new();
        binding.insert("id".to_string(), id.to_string());
        ops.push(PipelineOp::HashSet {
            key: keys::position_key(position),
            fields: binding,
        });

        let mut record_fields = HashMap::new();
        record_fields.insert("index_position".to_string(), position.to_string());
        ops.push(PipelineOp::HashSet {
            key: keys::record_key(id),
            fields: record_fields,
        });

        let mut backup = HashMap::new();
        backup.insert(
            "vector".to_string(),
            serde_json::to_string(embedding).unwrap_or_default(),
        );
        ops.push(PipelineOp::HashSet {
            key: keys::embedding_key(id),
            fields: backup,
        });
        if self.ttl_seconds > 0 {
            ops.push(PipelineOp::Expire {
                key: keys::embedding_key(id),
                ttl_seconds: self.ttl_seconds,
            });
        }

        ops
    }

    /// Pipeline ops dropping the bindings for the given positions.
    pub fn stage_unbind(&self, positions: &[u64]) -> Vec<PipelineOp> {
        positions
            .iter()
            .map(|position| PipelineOp::Delete {
                key: keys::position_key(*position),
            })
            .collect()
    }

    /// Resolve a position to its record id.
    pub async fn id_at(&self, position: u64) -> Result<Option<String>, ChunkStoreError> {
        self.store
            .hash_get(&keys::position_key(position), "id")
            .await
            .map_err(|e| ChunkStoreError::store_op("hash_get", e))
    }

    /// Resolve a record id to its vector position.
    pub async fn position_of(&self, id: &str) -> Result<Option<u64>, ChunkStoreError> {
        let raw = self
            .store
            .hash_get(&keys::record_key(id), "index_position")
            .await
            .map_err(|e| ChunkStoreError::store_op("hash_get", e))?;
        Ok(raw.and_then(|v| v.parse::<u64>().ok()))
    }

    /// Read the raw vector backup for a record.
    pub async fn embedding_of(&self, id: &str) -> Result<Option<Vec<f32>>, ChunkStoreError> {
        let raw = self
            .store
            .hash_get(&keys::embedding_key(id), "vector")
            .await
            .map_err(|e| ChunkStoreError::store_op("hash_get", e))?;
        match raw {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| ChunkStoreError::serialization(format!("bad embedding backup: {e}"))),
            None => Ok(None),
        }
    }
}
