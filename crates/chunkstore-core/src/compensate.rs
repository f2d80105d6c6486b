//! Compensating rollback.
//!
//! Multi-step writes record an inverse action for every committed step as
//! they go; on abort the log runs in reverse, best-effort. The log lives in
//! memory only: a process restart mid-operation loses it, and the orphan
//! reconciler is the recovery path for whatever was left behind.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use chunkstore_adapters::{FieldIndexManager, MetadataStore, PipelineOp, VectorIndex};
use chunkstore_types::FieldValue;

/// One inverse action.
#[derive(Debug)]
pub enum CompensationAction {
    /// Delete metadata keys written during the forward pass.
    DeleteKeys(Vec<String>),
    /// Remove a record from the secondary indexes it was added to.
    RemoveFromIndexes {
        id: String,
        snapshot: HashMap<String, FieldValue>,
    },
    /// Remove vectors added during the forward pass.
    RemoveVectors(Vec<u64>),
}

/// Inverse actions accumulated during a forward pass.
#[derive(Debug, Default)]
pub struct CompensationLog {
    actions: Vec<CompensationAction>,
}

impl CompensationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: CompensationAction) {
        self.actions.push(action);
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run all recorded actions in reverse order, best-effort.
    ///
    /// Failures are logged and do not stop the remaining actions; whatever
    /// cannot be undone here is left for the reconciler.
    pub async fn run(
        self,
        store: &Arc<dyn MetadataStore>,
        fields: Option<&Arc<dyn FieldIndexManager>>,
        vectors: Option<&Arc<dyn VectorIndex>>,
    ) {
        for action in self.actions.into_iter().rev() {
            match action {
                CompensationAction::DeleteKeys(keys) => {
                    let ops: Vec<PipelineOp> = keys
                        .iter()
                        .map(|key| PipelineOp::Delete { key: key.clone() })
                        .collect();
                    if let Err(error) = store.pipeline(ops).await {
                        warn!(%error, keys = keys.len(), "Rollback key deletion failed");
                    } else {
                        debug!(keys = keys.len(), "Rolled back staged keys");
                    }
                }
                CompensationAction::RemoveFromIndexes { id, snapshot } => {
                    let Some(manager) = fields else {
                        continue;
                    };
                    if let Err(error) = manager.remove_from_indexes(&id, &snapshot).await {
                        warn!(%error, id = %id, "Rollback index removal failed");
                    }
                }
                CompensationAction::RemoveVectors(mut positions) => {
                    let Some(index) = vectors else {
                        continue;
                    };
                    positions.sort_unstable_by(|a, b| b.cmp(a));
                    if let Err(error) = index.delete_vectors(&positions).await {
                        warn!(
                            %error,
                            positions = positions.len(),
                            "Rollback vector removal failed"
                        );
                    } else {
                        debug!(positions = positions.len(), "Rolled back added vectors");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkstore_adapters::{MemoryMetadataStore, MemoryVectorIndex, MetadataStore};

    #[tokio::test]
    async fn test_rollback_deletes_keys_and_vectors() {
        let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
        let index = Arc::new(MemoryVectorIndex::new());
        let vectors: Arc<dyn VectorIndex> = index.clone();

        let mut fields = HashMap::new();
        fields.insert("a".to_string(), "1".to_string());
        store.hash_set("record:x", fields).await.unwrap();
        vectors.add_vectors(&[vec![0.0, 1.0]]).await.unwrap();

        let mut log = CompensationLog::new();
        log.push(CompensationAction::DeleteKeys(vec!["record:x".to_string()]));
        log.push(CompensationAction::RemoveVectors(vec![0]));

        log.run(&store, None, Some(&vectors)).await;

        assert!(!store.exists("record:x").await.unwrap());
        assert_eq!(vectors.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_log_is_noop() {
        let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
        let log = CompensationLog::new();
        assert!(log.is_empty());
        log.run(&store, None, None).await;
    }
}
