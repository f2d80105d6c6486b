//! Query facade: filtered/ranked search and query-driven deletion.
//!
//! Matching itself is delegated to the field-index manager; this layer
//! validates criteria before any I/O, applies soft-delete visibility, and
//! drives per-id deletes without letting one failure abort the rest.

use tracing::{info, warn};

use chunkstore_adapters::{PipelineOp, PipelineResult};
use chunkstore_types::{ChunkStoreError, SearchCriteria, SearchHit};

use crate::keys;
use crate::store::ChunkStore;

/// How `delete_by_query` removes matched records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Flag records deleted, keep their storage and vectors.
    Soft,
    /// Remove every trace from both stores.
    Hard,
}

impl ChunkStore {
    /// Ranked search over the secondary indexes.
    ///
    /// A criteria with no text, no vector, and no filters is rejected
    /// before any I/O.
    pub async fn search(
        &self,
        criteria: &SearchCriteria,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<SearchHit>, ChunkStoreError> {
        let fields_mgr = self.require_fields()?;

        if criteria.is_empty() {
            return Err(ChunkStoreError::validation(
                "query must specify free text, a vector, or at least one field filter",
            ));
        }
        if let (Some(vector), Some(dim)) = (criteria.vector.as_ref(), self.config.embedding_dimension)
        {
            if vector.len() != dim {
                return Err(ChunkStoreError::validation(format!(
                    "query vector dimension {} does not match configured {dim}",
                    vector.len()
                )));
            }
        }

        fields_mgr
            .search(criteria, limit, offset)
            .await
            .map_err(|e| ChunkStoreError::index_op("search", e))
    }

    /// Search, dropping soft-deleted records unless `include_deleted`.
    pub async fn find_by_query(
        &self,
        criteria: &SearchCriteria,
        include_deleted: bool,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<SearchHit>, ChunkStoreError> {
        let hits = self.search(criteria, limit, offset).await?;
        if include_deleted || hits.is_empty() {
            return Ok(hits);
        }

        let ops: Vec<PipelineOp> = hits
            .iter()
            .map(|hit| PipelineOp::HashGet {
                key: keys::record_key(&hit.id),
                field: "deleted".to_string(),
            })
            .collect();
        let flags = self
            .store
            .pipeline(ops)
            .await
            .map_err(|e| ChunkStoreError::store_op("pipeline", e))?;

        Ok(hits
            .into_iter()
            .zip(flags)
            .filter(|(_, flag)| {
                !matches!(flag, PipelineResult::Value(Some(v)) if v == "true")
            })
            .map(|(hit, _)| hit)
            .collect())
    }

    /// Number of records matching the criteria.
    pub async fn count_by_query(
        &self,
        criteria: &SearchCriteria,
        include_deleted: bool,
    ) -> Result<usize, ChunkStoreError> {
        let hits = self.find_by_query(criteria, include_deleted, None, 0).await?;
        Ok(hits.len())
    }

    /// Delete every record matching the criteria, one id at a time.
    ///
    /// Best-effort across the result set: a per-id failure is logged and
    /// counted but does not abort the remaining ids. Returns how many
    /// records were actually removed.
    pub async fn delete_by_query(
        &self,
        criteria: &SearchCriteria,
        mode: DeleteMode,
    ) -> Result<usize, ChunkStoreError> {
        let hits = self.search(criteria, None, 0).await?;

        let mut removed = 0usize;
        let mut failed = 0usize;
        for hit in hits {
            let ids = [hit.id.clone()];
            let result = match mode {
                DeleteMode::Soft => self.delete_soft_many(&ids).await,
                DeleteMode::Hard => self.delete_hard(&ids).await,
            };
            match result {
                Ok(n) => removed += n,
                Err(error) => {
                    failed += 1;
                    warn!(id = %hit.id, %error, "Query-driven delete failed for record");
                }
            }
        }

        info!(removed, failed, ?mode, "Query-driven delete complete");
        Ok(removed)
    }
}
