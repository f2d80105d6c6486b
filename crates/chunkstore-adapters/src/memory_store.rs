//! In-memory metadata store.
//!
//! Reference backend for tests and embedded use. Hash and list values under
//! string keys, lazy TTL expiry, glob scans over a stable key order, and an
//! ordered non-atomic pipeline.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::BackendError;
use crate::metadata::{MetadataStore, PipelineOp, PipelineResult};

#[derive(Debug, Clone)]
enum StoredValue {
    Hash(HashMap<String, String>),
    List(Vec<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Instant::now())
    }
}

/// In-memory `MetadataStore`.
#[derive(Default)]
pub struct MemoryMetadataStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) keys. Test helper.
    pub fn key_count(&self) -> usize {
        let entries = self.entries.read().unwrap();
        entries.values().filter(|e| !e.is_expired()).count()
    }

    fn purge_if_expired(entries: &mut HashMap<String, Entry>, key: &str) {
        if entries.get(key).is_some_and(Entry::is_expired) {
            entries.remove(key);
        }
    }
}

/// Match `key` against a glob pattern where `*` matches any run of
/// characters.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let segments: Vec<&str> = pattern.split('*').collect();
    if segments.len() == 1 {
        return pattern == key;
    }

    let mut rest = key;
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(segment) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == segments.len() - 1 {
            return rest.ends_with(segment);
        } else {
            match rest.find(segment) {
                Some(at) => rest = &rest[at + segment.len()..],
                None => return false,
            }
        }
    }
    true
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn hash_set(
        &self,
        key: &str,
        fields: HashMap<String, String>,
    ) -> Result<(), BackendError> {
        let mut entries = self.entries.write().unwrap();
        Self::purge_if_expired(&mut entries, key);

        match entries.get_mut(key) {
            Some(entry) => match &mut entry.value {
                StoredValue::Hash(hash) => {
                    hash.extend(fields);
                }
                StoredValue::List(_) => {
                    return Err(BackendError::wrong_type(key, "hash"));
                }
            },
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: StoredValue::Hash(fields),
                        expires_at: None,
                    },
                );
            }
        }
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, BackendError> {
        let entries = self.entries.read().unwrap();
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => match &entry.value {
                StoredValue::Hash(hash) => Ok(hash.get(field).cloned()),
                StoredValue::List(_) => Err(BackendError::wrong_type(key, "hash")),
            },
            _ => Ok(None),
        }
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, BackendError> {
        let entries = self.entries.read().unwrap();
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => match &entry.value {
                StoredValue::Hash(hash) => Ok(hash.clone()),
                StoredValue::List(_) => Err(BackendError::wrong_type(key, "hash")),
            },
            _ => Ok(HashMap::new()),
        }
    }

    async fn list_replace(&self, key: &str, items: Vec<String>) -> Result<(), BackendError> {
        let mut entries = self.entries.write().unwrap();
        Self::purge_if_expired(&mut entries, key);

        if let Some(entry) = entries.get(key) {
            if matches!(entry.value, StoredValue::Hash(_)) {
                return Err(BackendError::wrong_type(key, "list"));
            }
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: StoredValue::List(items),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn list_get(&self, key: &str) -> Result<Vec<String>, BackendError> {
        let entries = self.entries.read().unwrap();
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => match &entry.value {
                StoredValue::List(items) => Ok(items.clone()),
                StoredValue::Hash(_) => Err(BackendError::wrong_type(key, "list")),
            },
            _ => Ok(Vec::new()),
        }
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<bool, BackendError> {
        let mut entries = self.entries.write().unwrap();
        Self::purge_if_expired(&mut entries, key);

        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + Duration::from_secs(ttl_seconds));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, BackendError> {
        let mut entries = self.entries.write().unwrap();
        let mut removed = 0;
        for key in keys {
            Self::purge_if_expired(&mut entries, key);
            if entries.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool, BackendError> {
        let entries = self.entries.read().unwrap();
        Ok(entries.get(key).is_some_and(|e| !e.is_expired()))
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        page_size: usize,
    ) -> Result<(u64, Vec<String>), BackendError> {
        if page_size == 0 {
            return Err(BackendError::backend("scan page_size must be > 0"));
        }

        // Stable order so a resumed cursor does not revisit keys.
        let mut keys: Vec<String> = {
            let entries = self.entries.read().unwrap();
            entries
                .iter()
                .filter(|(k, e)| !e.is_expired() && glob_match(pattern, k))
                .map(|(k, _)| k.clone())
                .collect()
        };
        keys.sort();

        let offset = cursor as usize;
        let page: Vec<String> = keys.iter().skip(offset).take(page_size).cloned().collect();
        let next = offset + page.len();
        let next_cursor = if next >= keys.len() { 0 } else { next as u64 };
        Ok((next_cursor, page))
    }

    async fn pipeline(&self, ops: Vec<PipelineOp>) -> Result<Vec<PipelineResult>, BackendError> {
        let mut results = Vec::with_capacity(ops.len());
        for op in ops {
            let result = match op {
                PipelineOp::HashSet { key, fields } => {
                    self.hash_set(&key, fields).await?;
                    PipelineResult::Done
                }
                PipelineOp::HashGet { key, field } => {
                    PipelineResult::Value(self.hash_get(&key, &field).await?)
                }
                PipelineOp::HashGetAll { key } => {
                    PipelineResult::Hash(self.hash_get_all(&key).await?)
                }
                PipelineOp::ListReplace { key, items } => {
                    self.list_replace(&key, items).await?;
                    PipelineResult::Done
                }
                PipelineOp::ListGet { key } => PipelineResult::List(self.list_get(&key).await?),
                PipelineOp::Expire { key, ttl_seconds } => {
                    PipelineResult::Bool(self.expire(&key, ttl_seconds).await?)
                }
                PipelineOp::Delete { key } => {
                    PipelineResult::Removed(self.delete(std::slice::from_ref(&key)).await?)
                }
                PipelineOp::Exists { key } => PipelineResult::Bool(self.exists(&key).await?),
            };
            results.push(result);
        }
        Ok(results)
    }
}
