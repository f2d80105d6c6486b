//! The public store handle and its builder.

use std::sync::Arc;

use tracing::warn;

use chunkstore_adapters::{
    FieldIndexManager, MetadataStore, PipelineOp, PipelineResult, VectorIndex,
};
use chunkstore_types::{ChunkStoreError, StoreConfig};

use crate::keys;
use crate::mapping::PositionMap;

/// Consistency layer over a metadata store, a vector index, and a
/// secondary field-index manager.
///
/// The metadata store is required. The vector index and field-index
/// manager are optional at construction; operations that need a missing
/// one fail with `ServiceUnavailable` before performing any I/O.
pub struct ChunkStore {
    pub(crate) store: Arc<dyn MetadataStore>,
    pub(crate) vectors: Option<Arc<dyn VectorIndex>>,
    pub(crate) fields: Option<Arc<dyn FieldIndexManager>>,
    pub(crate) config: StoreConfig,
    pub(crate) positions: PositionMap,
}

impl ChunkStore {
    pub fn builder() -> ChunkStoreBuilder {
        ChunkStoreBuilder::default()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub(crate) fn require_vectors(&self) -> Result<&Arc<dyn VectorIndex>, ChunkStoreError> {
        self.vectors
            .as_ref()
            .ok_or_else(|| ChunkStoreError::unavailable("vector index is not configured"))
    }

    pub(crate) fn require_fields(&self) -> Result<&Arc<dyn FieldIndexManager>, ChunkStoreError> {
        self.fields
            .as_ref()
            .ok_or_else(|| ChunkStoreError::unavailable("field index manager is not configured"))
    }

    /// Collect every key matching `pattern` via bounded, resumable cursor
    /// pages.
    pub(crate) async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, ChunkStoreError> {
        let mut keys = Vec::new();
        let mut cursor = 0;
        loop {
            let (next, page) = self
                .store
                .scan(cursor, pattern, self.config.scan_page_size)
                .await
                .map_err(|e| ChunkStoreError::store_op("scan", e))?;
            keys.extend(page);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }

    /// Count records, optionally including soft-deleted ones. Pages through
    /// `record:*` and reads the deleted flag pipeline-batched per page.
    pub(crate) async fn count_records(
        &self,
        include_deleted: bool,
    ) -> Result<usize, ChunkStoreError> {
        let mut count = 0;
        let mut cursor = 0;
        loop {
            let (next, page) = self
                .store
                .scan(cursor, &keys::record_pattern(), self.config.scan_page_size)
                .await
                .map_err(|e| ChunkStoreError::store_op("scan", e))?;

            if include_deleted {
                count += page.len();
            } else if !page.is_empty() {
                let ops: Vec<PipelineOp> = page
                    .iter()
                    .map(|key| PipelineOp::HashGet {
                        key: key.clone(),
                        field: "deleted".to_string(),
                    })
                    .collect();
                let results = self
                    .store
                    .pipeline(ops)
                    .await
                    .map_err(|e| ChunkStoreError::store_op("pipeline", e))?;
                count += results
                    .into_iter()
                    .filter(|r| !matches!(r, PipelineResult::Value(Some(v)) if v == "true"))
                    .count();
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(count)
    }

    /// Active counts on both stores: (active metadata records, vectors).
    pub(crate) async fn snapshot_counts(&self) -> Result<(usize, usize), ChunkStoreError> {
        let metadata = self.count_records(false).await?;
        let vectors = match &self.vectors {
            Some(index) => index
                .count()
                .await
                .map_err(|e| ChunkStoreError::index_op("count", e))?,
            None => 0,
        };
        Ok((metadata, vectors))
    }

    /// Compare post-operation counts against expectations and warn on
    /// mismatch. Never fails: count verification is advisory.
    pub(crate) async fn verify_counts(
        &self,
        operation: &str,
        expected_metadata: usize,
        expected_vectors: usize,
    ) {
        if !self.config.verify_counts {
            return;
        }
        match self.snapshot_counts().await {
            Ok((metadata, vectors)) => {
                if metadata != expected_metadata || vectors != expected_vectors {
                    warn!(
                        operation,
                        metadata,
                        expected_metadata,
                        vectors,
                        expected_vectors,
                        "Store counts diverge from expectation"
                    );
                }
            }
            Err(error) => {
                warn!(operation, %error, "Post-operation count verification failed");
            }
        }
    }

    /// Append a TTL refresh for `key` when expiry is configured.
    pub(crate) fn stage_ttl(&self, ops: &mut Vec<PipelineOp>, key: &str) {
        if self.config.ttl_seconds > 0 {
            ops.push(PipelineOp::Expire {
                key: key.to_string(),
                ttl_seconds: self.config.ttl_seconds,
            });
        }
    }
}

/// Builder for [`ChunkStore`].
#[derive(Default)]
pub struct ChunkStoreBuilder {
    store: Option<Arc<dyn MetadataStore>>,
    vectors: Option<Arc<dyn VectorIndex>>,
    fields: Option<Arc<dyn FieldIndexManager>>,
    config: Option<StoreConfig>,
}

impl ChunkStoreBuilder {
    pub fn metadata_store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn vector_index(mut self, vectors: Arc<dyn VectorIndex>) -> Self {
        self.vectors = Some(vectors);
        self
    }

    pub fn field_index(mut self, fields: Arc<dyn FieldIndexManager>) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<ChunkStore, ChunkStoreError> {
        let store = self
            .store
            .ok_or_else(|| ChunkStoreError::unavailable("metadata store is required"))?;
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let positions = PositionMap::new(store.clone(), config.ttl_seconds);
        Ok(ChunkStore {
            store,
            vectors: self.vectors,
            fields: self.fields,
            config,
            positions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkstore_adapters::{MemoryFieldIndex, MemoryMetadataStore, MemoryVectorIndex};

    fn full_store() -> ChunkStore {
        ChunkStore::builder()
            .metadata_store(Arc::new(MemoryMetadataStore::new()))
            .vector_index(Arc::new(MemoryVectorIndex::new()))
            .field_index(Arc::new(MemoryFieldIndex::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_metadata_store() {
        let result = ChunkStore::builder().build();
        assert!(matches!(
            result,
            Err(ChunkStoreError::ServiceUnavailable(_))
        ));
    }

    #[test]
    fn test_builder_defaults_config() {
        let store = ChunkStore::builder()
            .metadata_store(Arc::new(MemoryMetadataStore::new()))
            .build()
            .unwrap();
        assert!(store.config().verify_counts);
        assert!(store.require_vectors().is_err());
        assert!(store.require_fields().is_err());
    }

    #[tokio::test]
    async fn test_scan_keys_pages_through() {
        let store = full_store();
        for i in 0..5 {
            let mut fields = std::collections::HashMap::new();
            fields.insert("deleted".to_string(), "false".to_string());
            store
                .store
                .hash_set(&crate::keys::record_key(&format!("c{i}")), fields)
                .await
                .unwrap();
        }

        let keys = store.scan_keys("record:*").await.unwrap();
        assert_eq!(keys.len(), 5);
        assert_eq!(store.count_records(false).await.unwrap(), 5);
        assert_eq!(store.count_records(true).await.unwrap(), 5);
    }
}
