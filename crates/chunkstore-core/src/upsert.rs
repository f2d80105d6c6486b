//! Batched upsert: the staged-write / compensate / verify pipeline.
//!
//! Order of work per batch:
//! 1. validate input, 2. grow secondary indexes for new fields, 3. snapshot
//! counts, 4. stage metadata writes, 5. secondary-index each record
//! (per-record rollback), 6. execute the staged pipeline, 7. add vectors in
//! one call (whole-batch rollback on failure), 8. persist position
//! bindings, 9. re-read counts and warn on divergence.

use std::collections::HashSet;

use chrono::Utc;
use tracing::{debug, info, warn};

use chunkstore_adapters::{PipelineOp, PipelineResult};
use chunkstore_types::{
    ChunkStoreError, IndexKind, Record, SkippedRecord, UpsertItem, UpsertReport,
};

use crate::compensate::{CompensationAction, CompensationLog};
use crate::keys;
use crate::store::ChunkStore;

/// State of a record before the batch touched it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prior {
    Missing,
    Active,
    Deleted,
}

struct Staged {
    record: Record,
    ops: Vec<PipelineOp>,
    touched_keys: Vec<String>,
    prior: Prior,
}

impl ChunkStore {
    /// Upsert a batch of records into both stores.
    ///
    /// Structurally invalid input rejects the whole batch before any I/O.
    /// A record that fails flattening or secondary indexing is compensated
    /// and skipped without aborting its siblings; a vector index failure
    /// rolls back the entire surviving set, because metadata without a
    /// vector is a stronger invariant violation than losing the batch.
    pub async fn upsert_batch(
        &self,
        items: Vec<UpsertItem>,
    ) -> Result<UpsertReport, ChunkStoreError> {
        let vectors = self.require_vectors()?.clone();
        let fields_mgr = self.require_fields()?.clone();

        if items.is_empty() {
            return Err(ChunkStoreError::validation("upsert batch is empty"));
        }

        let mut records: Vec<Record> = Vec::with_capacity(items.len());
        for item in items {
            let record = item.into_record();
            if record.id.trim().is_empty() {
                return Err(ChunkStoreError::validation("record id must not be empty"));
            }
            records.push(record);
        }

        let mut expected_dim = self.config.embedding_dimension;
        for record in &records {
            if let Some(embedding) = &record.embedding {
                if embedding.is_empty() {
                    return Err(ChunkStoreError::validation(format!(
                        "record '{}' has an empty embedding",
                        record.id
                    )));
                }
                match expected_dim {
                    Some(dim) if embedding.len() != dim => {
                        return Err(ChunkStoreError::validation(format!(
                            "record '{}' has embedding dimension {}, expected {}",
                            record.id,
                            embedding.len(),
                            dim
                        )));
                    }
                    Some(_) => {}
                    None => expected_dim = Some(embedding.len()),
                }
            }
        }

        // Grow the secondary schema for fields this batch introduces.
        let known = fields_mgr
            .indexed_fields()
            .await
            .map_err(|e| ChunkStoreError::index_op("indexed_fields", e))?;
        let mut ensured: HashSet<String> = HashSet::new();
        for record in &records {
            for (field, value) in &record.fields {
                if !known.contains(field) && ensured.insert(field.clone()) {
                    fields_mgr
                        .ensure_index(field, IndexKind::for_value(value))
                        .await
                        .map_err(|e| ChunkStoreError::index_op("ensure_index", e))?;
                    debug!(field = %field, "Created index for newly observed field");
                }
            }
        }

        let (meta_before, vec_before) = if self.config.verify_counts {
            self.snapshot_counts().await?
        } else {
            (0, 0)
        };

        // Prior state per record, one pipeline round trip.
        let pre_ops: Vec<PipelineOp> = records
            .iter()
            .map(|r| PipelineOp::HashGet {
                key: keys::record_key(&r.id),
                field: "deleted".to_string(),
            })
            .collect();
        let pre_results = self
            .store
            .pipeline(pre_ops)
            .await
            .map_err(|e| ChunkStoreError::store_op("pipeline", e))?;
        let priors: Vec<Prior> = pre_results
            .into_iter()
            .map(|r| match r {
                PipelineResult::Value(Some(v)) if v == "true" => Prior::Deleted,
                PipelineResult::Value(Some(_)) => Prior::Active,
                _ => Prior::Missing,
            })
            .collect();

        // Stage metadata writes; flattening failures are isolated per record.
        let now_ms = Utc::now().timestamp_millis();
        let mut report = UpsertReport::new();
        let mut staged: Vec<Staged> = Vec::with_capacity(records.len());
        for (record, prior) in records.into_iter().zip(priors) {
            let flat = match record.flatten() {
                Ok(flat) => flat,
                Err(error) => {
                    warn!(id = %record.id, %error, "Record cannot be flattened, skipping");
                    report
                        .skipped
                        .push(SkippedRecord::new(&record.id, error.to_string()));
                    continue;
                }
            };

            let mut ops = Vec::new();
            let mut touched_keys = Vec::new();

            let record_key = keys::record_key(&record.id);
            let mut hash = flat.scalars;
            hash.insert("deleted".to_string(), "false".to_string());
            hash.insert("updated_at".to_string(), now_ms.to_string());
            ops.push(PipelineOp::HashSet {
                key: record_key.clone(),
                fields: hash,
            });
            self.stage_ttl(&mut ops, &record_key);
            touched_keys.push(record_key);

            for (field, items) in flat.arrays {
                let array_key = keys::array_key(&field, &record.id);
                ops.push(PipelineOp::ListReplace {
                    key: array_key.clone(),
                    items,
                });
                self.stage_ttl(&mut ops, &array_key);
                touched_keys.push(array_key);
            }

            staged.push(Staged {
                record,
                ops,
                touched_keys,
                prior,
            });
        }

        // Secondary indexing, per-record rollback: a bad record never
        // aborts its siblings.
        let mut survivors: Vec<Staged> = Vec::with_capacity(staged.len());
        for entry in staged {
            let id = entry.record.id.clone();
            match fields_mgr
                .index_record(&id, &entry.record.fields, entry.record.embedding.as_deref())
                .await
            {
                Ok(()) => survivors.push(entry),
                Err(error) => {
                    warn!(id = %id, %error, "Secondary indexing failed, dropping record");
                    if let Err(cleanup) = fields_mgr
                        .remove_from_indexes(&id, &entry.record.fields)
                        .await
                    {
                        warn!(id = %id, error = %cleanup, "Cleanup of partial indexing failed");
                    }
                    report
                        .skipped
                        .push(SkippedRecord::new(id, format!("indexing failed: {error}")));
                }
            }
        }

        if survivors.is_empty() {
            return Ok(report);
        }

        let mut log = CompensationLog::new();
        for entry in &survivors {
            log.push(CompensationAction::RemoveFromIndexes {
                id: entry.record.id.clone(),
                snapshot: entry.record.fields.clone(),
            });
        }

        // Execute all staged metadata writes in one round trip.
        let all_ops: Vec<PipelineOp> = survivors.iter().flat_map(|s| s.ops.clone()).collect();
        if let Err(error) = self.store.pipeline(all_ops).await {
            log.run(&self.store, Some(&fields_mgr), Some(&vectors)).await;
            return Err(ChunkStoreError::store_op("pipeline", error));
        }
        log.push(CompensationAction::DeleteKeys(
            survivors
                .iter()
                .flat_map(|s| s.touched_keys.iter().cloned())
                .collect(),
        ));

        // Add vectors in one batched call, then persist the bindings.
        let embedded: Vec<(String, Vec<f32>)> = survivors
            .iter()
            .filter_map(|s| {
                s.record
                    .embedding
                    .clone()
                    .map(|e| (s.record.id.clone(), e))
            })
            .collect();
        let mut added = 0usize;
        if !embedded.is_empty() {
            let payload: Vec<Vec<f32>> = embedded.iter().map(|(_, e)| e.clone()).collect();
            let positions = match vectors.add_vectors(&payload).await {
                Ok(positions) => positions,
                Err(error) => {
                    log.run(&self.store, Some(&fields_mgr), Some(&vectors)).await;
                    return Err(ChunkStoreError::index_op("add_vectors", error));
                }
            };
            added = positions.len();
            log.push(CompensationAction::RemoveVectors(positions.clone()));

            let mut bind_ops = Vec::new();
            for ((id, embedding), position) in embedded.iter().zip(&positions) {
                bind_ops.extend(self.positions.stage_bind(id, *position, embedding));
            }
            if let Err(error) = self.store.pipeline(bind_ops).await {
                log.run(&self.store, Some(&fields_mgr), Some(&vectors)).await;
                return Err(ChunkStoreError::store_op("pipeline", error));
            }
        }

        report
            .committed
            .extend(survivors.iter().map(|s| s.record.id.clone()));

        if self.config.verify_counts {
            let newly_active = survivors
                .iter()
                .filter(|s| s.prior != Prior::Active)
                .count();
            self.verify_counts(
                "upsert_batch",
                meta_before + newly_active,
                vec_before + added,
            )
            .await;
        }

        info!(
            committed = report.committed.len(),
            skipped = report.skipped.len(),
            vectors_added = added,
            "Upsert batch complete"
        );
        Ok(report)
    }

    /// Upsert a single record.
    pub async fn upsert_one(&self, record: Record) -> Result<(), ChunkStoreError> {
        let id = record.id.clone();
        let report = self.upsert_batch(vec![record.into()]).await?;
        if report.committed.iter().any(|c| c == &id) {
            return Ok(());
        }
        let reason = report
            .skipped
            .first()
            .map(|s| s.reason.clone())
            .unwrap_or_else(|| "record was not committed".to_string());
        Err(ChunkStoreError::unexpected(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chunkstore_adapters::{
        MemoryFieldIndex, MemoryMetadataStore, MemoryVectorIndex, VectorIndex,
    };

    fn full_store() -> ChunkStore {
        ChunkStore::builder()
            .metadata_store(Arc::new(MemoryMetadataStore::new()))
            .vector_index(Arc::new(MemoryVectorIndex::new()))
            .field_index(Arc::new(MemoryFieldIndex::new()))
            .build()
            .unwrap()
    }

    fn record(id: &str) -> Record {
        Record::new(id)
            .with_field("title", format!("title of {id}"))
            .with_array("tags", vec!["one".to_string(), "two".to_string()])
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let store = full_store();
        let result = store.upsert_batch(vec![]).await;
        assert!(matches!(result, Err(ChunkStoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_empty_id_rejected() {
        let store = full_store();
        let result = store.upsert_batch(vec![Record::new("").into()]).await;
        assert!(matches!(result, Err(ChunkStoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_mixed_dimensions_rejected() {
        let store = full_store();
        let items = vec![
            record("a").with_embedding(vec![0.0; 8]).into(),
            record("b").with_embedding(vec![0.0; 4]).into(),
        ];
        let result = store.upsert_batch(items).await;
        assert!(matches!(result, Err(ChunkStoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_requires_vector_index() {
        let store = ChunkStore::builder()
            .metadata_store(Arc::new(MemoryMetadataStore::new()))
            .field_index(Arc::new(MemoryFieldIndex::new()))
            .build()
            .unwrap();
        let result = store.upsert_batch(vec![record("a").into()]).await;
        assert!(matches!(
            result,
            Err(ChunkStoreError::ServiceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_commit_writes_both_stores() {
        let store = full_store();
        let items = vec![
            record("a").with_embedding(vec![0.1; 8]).into(),
            record("b").with_embedding(vec![0.2; 8]).into(),
        ];
        let report = store.upsert_batch(items).await.unwrap();
        assert_eq!(report.committed, vec!["a".to_string(), "b".to_string()]);
        assert!(report.is_complete());

        assert_eq!(store.count_active(false).await.unwrap(), 2);
        let vectors = store.require_vectors().unwrap();
        assert_eq!(vectors.count().await.unwrap(), 2);

        assert_eq!(store.positions.position_of("a").await.unwrap(), Some(0));
        assert_eq!(store.positions.id_at(1).await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_bad_record_skipped_siblings_commit() {
        let store = full_store();
        let bad = Record::new("bad").with_field("deleted", true);
        let report = store
            .upsert_batch(vec![record("good").into(), bad.into()])
            .await
            .unwrap();

        assert_eq!(report.committed, vec!["good".to_string()]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].id, "bad");
        assert_eq!(store.count_active(false).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reupsert_updates_in_place() {
        let store = full_store();
        store
            .upsert_one(Record::new("a").with_field("title", "first"))
            .await
            .unwrap();
        store
            .upsert_one(Record::new("a").with_field("title", "second"))
            .await
            .unwrap();

        assert_eq!(store.count_active(false).await.unwrap(), 1);
        let got = store.get_one("a", false, false).await.unwrap().unwrap();
        assert_eq!(
            got.fields.get("title").and_then(|v| v.as_str()),
            Some("second")
        );
    }
}
