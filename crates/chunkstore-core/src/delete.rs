//! Soft and hard deletion.
//!
//! Soft delete flips the record flag and leaves the vector index alone.
//! Hard delete removes every trace from both stores: vector slots first
//! (one call, high-to-low), then position bindings, then every key owned
//! by the record, then its secondary index entries. Verification after a
//! hard delete only logs: availability wins over halting here.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use chunkstore_adapters::{PipelineOp, PipelineResult};
use chunkstore_types::{ChunkStoreError, FieldValue};

use crate::keys::{self, StoreKey};
use crate::store::ChunkStore;

impl ChunkStore {
    /// Soft-delete records: batched flag flip plus TTL refresh. Returns the
    /// number of records that existed and were flagged.
    pub async fn delete_soft_many(&self, ids: &[String]) -> Result<usize, ChunkStoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let (meta_before, vec_before) = if self.config.verify_counts {
            self.snapshot_counts().await?
        } else {
            (0, 0)
        };

        let pre_ops: Vec<PipelineOp> = ids
            .iter()
            .map(|id| PipelineOp::HashGet {
                key: keys::record_key(id),
                field: "deleted".to_string(),
            })
            .collect();
        let pre = self
            .store
            .pipeline(pre_ops)
            .await
            .map_err(|e| ChunkStoreError::store_op("pipeline", e))?;

        let mut ops = Vec::new();
        let mut flagged = 0usize;
        let mut newly_inactive = 0usize;
        for (id, prior) in ids.iter().zip(pre) {
            let prior = match prior {
                PipelineResult::Value(v) => v,
                _ => None,
            };
            let Some(prior) = prior else {
                debug!(id = %id, "Soft delete of missing record is a no-op");
                continue;
            };
            if prior != "true" {
                newly_inactive += 1;
            }
            flagged += 1;

            let record_key = keys::record_key(id);
            let mut fields = HashMap::new();
            fields.insert("deleted".to_string(), "true".to_string());
            ops.push(PipelineOp::HashSet {
                key: record_key.clone(),
                fields,
            });
            self.stage_ttl(&mut ops, &record_key);
        }

        if !ops.is_empty() {
            self.store
                .pipeline(ops)
                .await
                .map_err(|e| ChunkStoreError::store_op("pipeline", e))?;
        }

        if self.config.verify_counts {
            self.verify_counts(
                "delete_soft",
                meta_before.saturating_sub(newly_inactive),
                vec_before,
            )
            .await;
        }

        info!(requested = ids.len(), flagged, "Soft delete complete");
        Ok(flagged)
    }

    /// Soft-delete one record. Returns whether it existed.
    pub async fn delete_soft_one(&self, id: &str) -> Result<bool, ChunkStoreError> {
        let ids = [id.to_string()];
        let flagged = self.delete_soft_many(&ids).await?;
        Ok(flagged > 0)
    }

    /// Hard-delete records: remove every trace from both stores. Returns
    /// the number of records that existed and were processed.
    pub async fn delete_hard(&self, ids: &[String]) -> Result<usize, ChunkStoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let (meta_before, vec_before) = if self.config.verify_counts {
            self.snapshot_counts().await?
        } else {
            (0, 0)
        };

        // Fetch each record hash up front: it carries the vector position
        // and the field values the secondary indexes must forget, both of
        // which are gone once the keys are deleted.
        let fetch_ops: Vec<PipelineOp> = ids
            .iter()
            .map(|id| PipelineOp::HashGetAll {
                key: keys::record_key(id),
            })
            .collect();
        let fetched = self
            .store
            .pipeline(fetch_ops)
            .await
            .map_err(|e| ChunkStoreError::store_op("pipeline", e))?;

        let mut existing: Vec<(String, HashMap<String, String>)> = Vec::new();
        for (id, result) in ids.iter().zip(fetched) {
            let hash = result.into_hash();
            if hash.is_empty() {
                debug!(id = %id, "Hard delete of missing record is a no-op");
                continue;
            }
            existing.push((id.clone(), hash));
        }
        if existing.is_empty() {
            return Ok(0);
        }

        let active_removed = existing
            .iter()
            .filter(|(_, hash)| hash.get("deleted").map(String::as_str) != Some("true"))
            .count();

        // Vector slots go first, high-to-low in a single call so the
        // not-yet-removed positions stay valid while the index compacts.
        // A failure here aborts before any metadata is touched; nothing is
        // undone on the index side.
        let mut positions: Vec<u64> = existing
            .iter()
            .filter_map(|(_, hash)| hash.get("index_position").and_then(|v| v.parse().ok()))
            .collect();
        positions.sort_unstable_by(|a, b| b.cmp(a));
        positions.dedup();

        let mut vectors_removed = 0usize;
        if !positions.is_empty() {
            let vectors = self.require_vectors()?;
            vectors_removed = vectors
                .delete_vectors(&positions)
                .await
                .map_err(|e| ChunkStoreError::index_op("delete_vectors", e))?;
        }

        // Drop the now-stale bindings, then shift the surviving bindings
        // down over the compacted slots.
        if !positions.is_empty() {
            let unbind = self.positions.stage_unbind(&positions);
            self.store
                .pipeline(unbind)
                .await
                .map_err(|e| ChunkStoreError::store_op("pipeline", e))?;
            self.rebind_after_removal(&positions).await?;
        }

        // Field snapshots for secondary index removal, taken from the
        // hashes fetched before deletion.
        let snapshots: Vec<(String, HashMap<String, FieldValue>)> = existing
            .iter()
            .map(|(id, hash)| {
                let mut snapshot = HashMap::new();
                for (name, raw) in hash {
                    if matches!(name.as_str(), "deleted" | "index_position" | "updated_at") {
                        continue;
                    }
                    match FieldValue::from_stored(raw) {
                        Ok(value) => {
                            snapshot.insert(name.clone(), value);
                        }
                        Err(error) => {
                            warn!(id = %id, field = %name, %error, "Undecodable field in snapshot");
                        }
                    }
                }
                (id.clone(), snapshot)
            })
            .collect();

        // Discover every key owned by each id through bounded cursor pages,
        // then delete them in one round trip.
        let mut doomed: Vec<String> = Vec::new();
        for (id, _) in &existing {
            doomed.extend(self.scan_keys(&keys::id_pattern(id)).await?);
        }
        if !doomed.is_empty() {
            let ops: Vec<PipelineOp> = doomed
                .iter()
                .map(|key| PipelineOp::Delete { key: key.clone() })
                .collect();
            self.store
                .pipeline(ops)
                .await
                .map_err(|e| ChunkStoreError::store_op("pipeline", e))?;
        }

        // Secondary index removal is best-effort per id.
        if let Some(fields_mgr) = &self.fields {
            for (id, snapshot) in &snapshots {
                if let Err(error) = fields_mgr.remove_from_indexes(id, snapshot).await {
                    warn!(id = %id, %error, "Secondary index removal failed");
                }
            }
        }

        if self.config.verify_counts {
            self.verify_counts(
                "delete_hard",
                meta_before.saturating_sub(active_removed),
                vec_before.saturating_sub(vectors_removed),
            )
            .await;
        }

        if let Some(fields_mgr) = &self.fields {
            match fields_mgr.prune_empty().await {
                Ok(dropped) if !dropped.is_empty() => {
                    info!(dropped = dropped.len(), "Dropped empty field indexes");
                }
                Ok(_) => {}
                Err(error) => warn!(%error, "Empty-index pruning failed"),
            }
        }

        info!(
            requested = ids.len(),
            processed = existing.len(),
            vectors_removed,
            keys_removed = doomed.len(),
            "Hard delete complete"
        );
        Ok(existing.len())
    }

    /// Hard-delete every known record.
    pub async fn delete_hard_all(&self) -> Result<usize, ChunkStoreError> {
        let record_keys = self.scan_keys(&keys::record_pattern()).await?;
        let ids: Vec<String> = record_keys
            .iter()
            .filter_map(|key| keys::id_from_record_key(key))
            .map(str::to_string)
            .collect();
        info!(records = ids.len(), "Hard-deleting all records");
        self.delete_hard(&ids).await
    }

    /// After a compacting removal, every binding above a removed slot is
    /// off by the number of slots removed below it. Shift those bindings
    /// down so position and record keep resolving to each other.
    pub(crate) async fn rebind_after_removal(
        &self,
        removed: &[u64],
    ) -> Result<usize, ChunkStoreError> {
        if removed.is_empty() {
            return Ok(0);
        }
        let mut removed_sorted = removed.to_vec();
        removed_sorted.sort_unstable();
        removed_sorted.dedup();

        let binding_keys = self.scan_keys(&keys::position_pattern()).await?;
        let mut bound: Vec<u64> = binding_keys
            .iter()
            .filter_map(|key| match StoreKey::parse(key) {
                Some(StoreKey::Position { position }) => Some(position),
                _ => None,
            })
            .collect();
        bound.sort_unstable();

        let mut ops = Vec::new();
        let mut moved = 0usize;
        for old in bound {
            let shift = removed_sorted.partition_point(|r| *r < old) as u64;
            if shift == 0 {
                continue;
            }
            let Some(id) = self.positions.id_at(old).await? else {
                ops.push(PipelineOp::Delete {
                    key: keys::position_key(old),
                });
                continue;
            };
            let new = old - shift;

            ops.push(PipelineOp::Delete {
                key: keys::position_key(old),
            });
            let mut binding = HashMap::new();
            binding.insert("id".to_string(), id.clone());
            ops.push(PipelineOp::HashSet {
                key: keys::position_key(new),
                fields: binding,
            });
            let mut record_fields = HashMap::new();
            record_fields.insert("index_position".to_string(), new.to_string());
            ops.push(PipelineOp::HashSet {
                key: keys::record_key(&id),
                fields: record_fields,
            });
            moved += 1;
        }

        if !ops.is_empty() {
            self.store
                .pipeline(ops)
                .await
                .map_err(|e| ChunkStoreError::store_op("pipeline", e))?;
            debug!(moved, "Shifted position bindings after removal");
        }
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chunkstore_adapters::{
        MemoryFieldIndex, MemoryMetadataStore, MemoryVectorIndex, VectorIndex,
    };
    use chunkstore_types::Record;

    fn full_store() -> ChunkStore {
        ChunkStore::builder()
            .metadata_store(Arc::new(MemoryMetadataStore::new()))
            .vector_index(Arc::new(MemoryVectorIndex::new()))
            .field_index(Arc::new(MemoryFieldIndex::new()))
            .build()
            .unwrap()
    }

    async fn seed(store: &ChunkStore, ids: &[&str]) {
        let items = ids
            .iter()
            .map(|id| {
                Record::new(*id)
                    .with_field("title", format!("title {id}"))
                    .with_array("tags", vec!["t".to_string()])
                    .with_embedding(vec![0.5; 4])
                    .into()
            })
            .collect();
        let report = store.upsert_batch(items).await.unwrap();
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_soft_delete_leaves_vectors() {
        let store = full_store();
        seed(&store, &["a", "b"]).await;

        let flagged = store
            .delete_soft_many(&["a".to_string(), "ghost".to_string()])
            .await
            .unwrap();
        assert_eq!(flagged, 1);

        assert_eq!(store.count_active(false).await.unwrap(), 1);
        assert_eq!(store.count_all().await.unwrap(), 2);
        let vectors = store.require_vectors().unwrap();
        assert_eq!(vectors.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_soft_delete_is_idempotent() {
        let store = full_store();
        seed(&store, &["a"]).await;

        assert!(store.delete_soft_one("a").await.unwrap());
        assert!(store.delete_soft_one("a").await.unwrap());
        assert_eq!(store.count_active(false).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_hard_delete_removes_every_trace() {
        let store = full_store();
        seed(&store, &["a", "b"]).await;

        let processed = store.delete_hard(&["a".to_string()]).await.unwrap();
        assert_eq!(processed, 1);

        // No key of any kind remains for the record.
        let leftover = store.scan_keys(&keys::id_pattern("a")).await.unwrap();
        assert!(leftover.is_empty(), "leftover keys: {leftover:?}");

        assert_eq!(store.count_active(false).await.unwrap(), 1);
        let vectors = store.require_vectors().unwrap();
        assert_eq!(vectors.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_hard_delete_rebinds_shifted_positions() {
        let store = full_store();
        seed(&store, &["a", "b", "c"]).await;

        // a sat at position 0; b and c shift down by one.
        store.delete_hard(&["a".to_string()]).await.unwrap();

        assert_eq!(store.positions.position_of("b").await.unwrap(), Some(0));
        assert_eq!(store.positions.position_of("c").await.unwrap(), Some(1));
        assert_eq!(store.positions.id_at(0).await.unwrap().as_deref(), Some("b"));
        assert_eq!(store.positions.id_at(1).await.unwrap().as_deref(), Some("c"));
        assert_eq!(store.positions.id_at(2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_hard_delete_all() {
        let store = full_store();
        seed(&store, &["a", "b", "c"]).await;

        let processed = store.delete_hard_all().await.unwrap();
        assert_eq!(processed, 3);
        assert_eq!(store.count_all().await.unwrap(), 0);
        let vectors = store.require_vectors().unwrap();
        assert_eq!(vectors.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_hard_delete_missing_is_noop() {
        let store = full_store();
        let processed = store.delete_hard(&["ghost".to_string()]).await.unwrap();
        assert_eq!(processed, 0);
    }
}
