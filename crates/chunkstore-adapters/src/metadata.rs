//! Metadata store trait and the pipeline command model.
//!
//! The metadata store holds hash and list values under string keys with
//! optional expiry. Commands can be batched into a pipeline: one round
//! trip, results in submission order, no atomicity across commands.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::BackendError;

/// A single command in a pipeline.
#[derive(Debug, Clone)]
pub enum PipelineOp {
    /// Merge fields into the hash at `key`, creating it if missing.
    HashSet {
        key: String,
        fields: HashMap<String, String>,
    },
    /// Read one hash field.
    HashGet { key: String, field: String },
    /// Read a whole hash. Missing key yields an empty map.
    HashGetAll { key: String },
    /// Replace the list at `key` wholesale.
    ListReplace { key: String, items: Vec<String> },
    /// Read a whole list. Missing key yields an empty list.
    ListGet { key: String },
    /// Set expiry on a key.
    Expire { key: String, ttl_seconds: u64 },
    /// Delete a key.
    Delete { key: String },
    /// Key existence check.
    Exists { key: String },
}

/// Result of one pipeline command, in submission order.
#[derive(Debug, Clone)]
pub enum PipelineResult {
    /// Write acknowledged.
    Done,
    /// Single-field read.
    Value(Option<String>),
    /// Whole-hash read.
    Hash(HashMap<String, String>),
    /// Whole-list read.
    List(Vec<String>),
    /// Existence or expiry outcome.
    Bool(bool),
    /// Number of keys removed.
    Removed(usize),
}

impl PipelineResult {
    /// Unwrap a single-field read.
    pub fn into_value(self) -> Option<String> {
        match self {
            PipelineResult::Value(v) => v,
            _ => None,
        }
    }

    /// Unwrap a whole-hash read.
    pub fn into_hash(self) -> HashMap<String, String> {
        match self {
            PipelineResult::Hash(h) => h,
            _ => HashMap::new(),
        }
    }

    /// Unwrap a whole-list read.
    pub fn into_list(self) -> Vec<String> {
        match self {
            PipelineResult::List(l) => l,
            _ => Vec::new(),
        }
    }

    /// Unwrap a boolean outcome.
    pub fn into_bool(self) -> bool {
        matches!(self, PipelineResult::Bool(true))
    }
}

/// TTL'd hash/list key-value store.
///
/// `scan` is the only sanctioned way to discover keys by pattern: it caps
/// the page size per round-trip and hands back a resumable cursor (0 when
/// exhausted). Pattern syntax is glob with `*` wildcards.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Merge fields into the hash at `key`, creating it if missing.
    async fn hash_set(
        &self,
        key: &str,
        fields: HashMap<String, String>,
    ) -> Result<(), BackendError>;

    /// Read one hash field.
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, BackendError>;

    /// Read a whole hash. Missing key yields an empty map.
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, BackendError>;

    /// Replace the list at `key` wholesale.
    async fn list_replace(&self, key: &str, items: Vec<String>) -> Result<(), BackendError>;

    /// Read a whole list. Missing key yields an empty list.
    async fn list_get(&self, key: &str) -> Result<Vec<String>, BackendError>;

    /// Set expiry on a key. Returns false when the key does not exist.
    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<bool, BackendError>;

    /// Delete keys. Returns how many existed.
    async fn delete(&self, keys: &[String]) -> Result<usize, BackendError>;

    /// Key existence check.
    async fn exists(&self, key: &str) -> Result<bool, BackendError>;

    /// One page of pattern-matched keys. Pass cursor 0 to start; a returned
    /// cursor of 0 means the scan is exhausted.
    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        page_size: usize,
    ) -> Result<(u64, Vec<String>), BackendError>;

    /// Execute commands in one round trip, in order, without atomicity.
    async fn pipeline(&self, ops: Vec<PipelineOp>) -> Result<Vec<PipelineResult>, BackendError>;
}
