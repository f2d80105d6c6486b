//! Record retrieval, counting, and id listing.

use std::collections::{HashMap, HashSet};

use chunkstore_adapters::PipelineOp;
use chunkstore_types::{ChunkStoreError, Record};

use crate::keys::{self, StoreKey};
use crate::store::ChunkStore;

impl ChunkStore {
    /// Fetch records by id, preserving input order and skipping missing
    /// ones. Soft-deleted records are skipped unless `include_deleted`.
    pub async fn get_many(
        &self,
        ids: &[String],
        include_vectors: bool,
        include_deleted: bool,
    ) -> Result<Vec<Record>, ChunkStoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

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

        let mut records = Vec::new();
        for (id, result) in ids.iter().zip(fetched) {
            let hash = result.into_hash();
            if hash.is_empty() {
                continue;
            }
            if !include_deleted && hash.get("deleted").map(String::as_str) == Some("true") {
                continue;
            }

            // Array fields are discovered by pattern: every key owned by
            // the id that parses as an array key.
            let owned = self.scan_keys(&keys::id_pattern(id)).await?;
            let array_fields: Vec<String> = owned
                .iter()
                .filter_map(|key| match StoreKey::parse(key) {
                    Some(StoreKey::Array { field, id: owner }) if &owner == id => Some(field),
                    _ => None,
                })
                .collect();

            let mut arrays = HashMap::new();
            if !array_fields.is_empty() {
                let list_ops: Vec<PipelineOp> = array_fields
                    .iter()
                    .map(|field| PipelineOp::ListGet {
                        key: keys::array_key(field, id),
                    })
                    .collect();
                let lists = self
                    .store
                    .pipeline(list_ops)
                    .await
                    .map_err(|e| ChunkStoreError::store_op("pipeline", e))?;
                for (field, list) in array_fields.into_iter().zip(lists) {
                    arrays.insert(field, list.into_list());
                }
            }

            let mut record = Record::from_stored(id, &hash, arrays)?;
            if include_vectors {
                record.embedding = self.positions.embedding_of(id).await?;
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Fetch one record by id.
    pub async fn get_one(
        &self,
        id: &str,
        include_vectors: bool,
        include_deleted: bool,
    ) -> Result<Option<Record>, ChunkStoreError> {
        let ids = [id.to_string()];
        let mut records = self
            .get_many(&ids, include_vectors, include_deleted)
            .await?;
        Ok(records.pop())
    }

    /// Read the raw vector backup for one record.
    pub async fn get_embedding(&self, id: &str) -> Result<Option<Vec<f32>>, ChunkStoreError> {
        self.positions.embedding_of(id).await
    }

    /// Read the raw vector backups for several records, in input order.
    pub async fn get_embeddings(
        &self,
        ids: &[String],
    ) -> Result<Vec<Option<Vec<f32>>>, ChunkStoreError> {
        let mut embeddings = Vec::with_capacity(ids.len());
        for id in ids {
            embeddings.push(self.positions.embedding_of(id).await?);
        }
        Ok(embeddings)
    }

    /// Number of records, excluding soft-deleted ones unless asked.
    pub async fn count_active(&self, include_deleted: bool) -> Result<usize, ChunkStoreError> {
        self.count_records(include_deleted).await
    }

    /// Number of records including soft-deleted ones.
    pub async fn count_all(&self) -> Result<usize, ChunkStoreError> {
        self.count_records(true).await
    }

    /// List known record ids (soft-deleted included), sorted, optionally
    /// intersected with a filter set.
    pub async fn list_ids(
        &self,
        filter: Option<&[String]>,
    ) -> Result<Vec<String>, ChunkStoreError> {
        let record_keys = self.scan_keys(&keys::record_pattern()).await?;
        let mut ids: Vec<String> = record_keys
            .iter()
            .filter_map(|key| keys::id_from_record_key(key))
            .map(str::to_string)
            .collect();

        if let Some(filter) = filter {
            let allowed: HashSet<&str> = filter.iter().map(String::as_str).collect();
            ids.retain(|id| allowed.contains(id.as_str()));
        }

        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chunkstore_adapters::{MemoryFieldIndex, MemoryMetadataStore, MemoryVectorIndex};

    fn full_store() -> ChunkStore {
        ChunkStore::builder()
            .metadata_store(Arc::new(MemoryMetadataStore::new()))
            .vector_index(Arc::new(MemoryVectorIndex::new()))
            .field_index(Arc::new(MemoryFieldIndex::new()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_roundtrip_populated_fields() {
        let store = full_store();
        let record = Record::new("a")
            .with_field("title", "intro")
            .with_field("tokens", 42i64)
            .with_array("tags", vec!["x".to_string(), "y".to_string()])
            .with_embedding(vec![0.25; 4]);
        store.upsert_one(record.clone()).await.unwrap();

        let got = store.get_one("a", true, false).await.unwrap().unwrap();
        assert_eq!(got.id, record.id);
        assert_eq!(got.fields, record.fields);
        assert_eq!(got.arrays, record.arrays);
        assert_eq!(got.embedding, record.embedding);
        assert!(!got.deleted);
        assert_eq!(got.index_position, Some(0));
        assert!(got.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_get_many_deleted_visibility() {
        let store = full_store();
        store.upsert_one(Record::new("a")).await.unwrap();
        store.upsert_one(Record::new("b")).await.unwrap();
        store.delete_soft_one("b").await.unwrap();

        let ids = vec!["a".to_string(), "b".to_string(), "ghost".to_string()];
        let visible = store.get_many(&ids, false, false).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "a");

        let all = store.get_many(&ids, false, true).await.unwrap();
        assert_eq!(all.len(), 2);
        let b = all.iter().find(|r| r.id == "b").unwrap();
        assert!(b.deleted);
    }

    #[tokio::test]
    async fn test_get_embeddings() {
        let store = full_store();
        store
            .upsert_one(Record::new("a").with_embedding(vec![0.5; 4]))
            .await
            .unwrap();

        assert_eq!(
            store.get_embedding("a").await.unwrap(),
            Some(vec![0.5; 4])
        );
        let many = store
            .get_embeddings(&["a".to_string(), "ghost".to_string()])
            .await
            .unwrap();
        assert_eq!(many.len(), 2);
        assert!(many[0].is_some());
        assert!(many[1].is_none());
    }

    #[tokio::test]
    async fn test_list_ids_with_filter() {
        let store = full_store();
        for id in ["c", "a", "b"] {
            store.upsert_one(Record::new(id)).await.unwrap();
        }

        assert_eq!(store.list_ids(None).await.unwrap(), vec!["a", "b", "c"]);

        let filter = vec!["b".to_string(), "ghost".to_string()];
        assert_eq!(store.list_ids(Some(&filter)).await.unwrap(), vec!["b"]);
    }
}
