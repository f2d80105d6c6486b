//! In-memory field-index manager.
//!
//! Per-field inverted maps for structured filters, token postings for free
//! text, and cosine scoring over stored embeddings.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use chunkstore_types::{FieldValue, IndexKind, SearchCriteria, SearchHit};

use crate::error::BackendError;
use crate::field_index::FieldIndexManager;

#[derive(Debug, Default)]
struct FieldIndex {
    kind: Option<IndexKind>,
    /// Normalized term -> ids. For text indexes the terms are tokens; for
    /// tag/numeric indexes the term is the whole normalized value.
    postings: HashMap<String, HashSet<String>>,
}

impl FieldIndex {
    fn remove_id(&mut self, id: &str) {
        self.postings.retain(|_, ids| {
            ids.remove(id);
            !ids.is_empty()
        });
    }

    fn is_unused(&self) -> bool {
        self.postings.is_empty()
    }
}

#[derive(Default)]
struct Inner {
    indexes: HashMap<String, FieldIndex>,
    /// Last indexed scalar fields per id, returned as hit metadata.
    docs: HashMap<String, HashMap<String, FieldValue>>,
    vectors: HashMap<String, Vec<f32>>,
}

/// In-memory `FieldIndexManager`.
#[derive(Default)]
pub struct MemoryFieldIndex {
    inner: RwLock<Inner>,
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn normalize(value: &FieldValue) -> String {
    match value {
        FieldValue::Str(s) => s.to_lowercase(),
        other => other.to_stored(),
    }
}

fn terms_for(kind: IndexKind, value: &FieldValue) -> Vec<String> {
    match (kind, value) {
        (IndexKind::Text, FieldValue::Str(s)) => tokenize(s),
        _ => vec![normalize(value)],
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

impl MemoryFieldIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents known to the manager. Test helper.
    pub fn doc_count(&self) -> usize {
        self.inner.read().unwrap().docs.len()
    }
}

#[async_trait]
impl FieldIndexManager for MemoryFieldIndex {
    async fn ensure_index(&self, field: &str, kind: IndexKind) -> Result<bool, BackendError> {
        let mut inner = self.inner.write().unwrap();
        let index = inner.indexes.entry(field.to_string()).or_default();
        if index.kind.is_some() {
            return Ok(false);
        }
        index.kind = Some(kind);
        debug!(field, ?kind, "Created field index");
        Ok(true)
    }

    async fn drop_index(&self, field: &str) -> Result<bool, BackendError> {
        let mut inner = self.inner.write().unwrap();
        Ok(inner.indexes.remove(field).is_some())
    }

    async fn index_record(
        &self,
        id: &str,
        fields: &HashMap<String, FieldValue>,
        embedding: Option<&[f32]>,
    ) -> Result<(), BackendError> {
        let mut inner = self.inner.write().unwrap();

        // Re-indexing replaces the old postings for this id.
        for index in inner.indexes.values_mut() {
            index.remove_id(id);
        }

        for (field, value) in fields {
            if let Some(index) = inner.indexes.get_mut(field) {
                let kind = index.kind.unwrap_or(IndexKind::Tag);
                for term in terms_for(kind, value) {
                    index
                        .postings
                        .entry(term)
                        .or_default()
                        .insert(id.to_string());
                }
            }
        }

        inner.docs.insert(id.to_string(), fields.clone());
        match embedding {
            Some(vector) => {
                inner.vectors.insert(id.to_string(), vector.to_vec());
            }
            None => {
                inner.vectors.remove(id);
            }
        }
        Ok(())
    }

    async fn remove_from_indexes(
        &self,
        id: &str,
        snapshot: &HashMap<String, FieldValue>,
    ) -> Result<(), BackendError> {
        let mut inner = self.inner.write().unwrap();
        for field in snapshot.keys() {
            if let Some(index) = inner.indexes.get_mut(field) {
                index.remove_id(id);
            }
        }
        inner.docs.remove(id);
        inner.vectors.remove(id);
        Ok(())
    }

    async fn search(
        &self,
        criteria: &SearchCriteria,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<SearchHit>, BackendError> {
        let inner = self.inner.read().unwrap();

        // Structured filters narrow the candidate set; every filter must hit.
        let mut candidates: Option<HashSet<String>> = None;
        for (field, value) in &criteria.filters {
            let matched: HashSet<String> = match inner.indexes.get(field) {
                Some(index) => {
                    let kind = index.kind.unwrap_or(IndexKind::Tag);
                    let mut ids = HashSet::new();
                    for term in terms_for(kind, value) {
                        if let Some(found) = index.postings.get(&term) {
                            ids.extend(found.iter().cloned());
                        }
                    }
                    ids
                }
                None => HashSet::new(),
            };
            candidates = Some(match candidates {
                Some(existing) => existing.intersection(&matched).cloned().collect(),
                None => matched,
            });
            if candidates.as_ref().is_some_and(HashSet::is_empty) {
                return Ok(Vec::new());
            }
        }

        // Text scores: fraction of query tokens present for the id.
        let mut text_scores: HashMap<String, f32> = HashMap::new();
        if let Some(text) = criteria.text.as_deref() {
            let tokens = tokenize(text);
            if !tokens.is_empty() {
                let per_token = 1.0 / tokens.len() as f32;
                for token in &tokens {
                    for index in inner.indexes.values() {
                        if index.kind != Some(IndexKind::Text) {
                            continue;
                        }
                        if let Some(ids) = index.postings.get(token) {
                            for id in ids {
                                *text_scores.entry(id.clone()).or_default() += per_token;
                            }
                        }
                    }
                }
            }
        }

        // Vector scores: cosine against stored embeddings.
        let mut vector_scores: HashMap<String, f32> = HashMap::new();
        if let Some(query) = criteria.vector.as_deref() {
            for (id, vector) in &inner.vectors {
                vector_scores.insert(id.clone(), cosine(query, vector));
            }
        }

        let scored_ids: HashSet<String> = match &candidates {
            Some(ids) => ids.clone(),
            None => {
                // No filters: candidates are whatever text/vector touched.
                let mut ids: HashSet<String> = text_scores.keys().cloned().collect();
                ids.extend(vector_scores.keys().cloned());
                ids
            }
        };

        let mut hits: Vec<SearchHit> = scored_ids
            .into_iter()
            .filter(|id| {
                // With a text criterion, filter-only candidates must still
                // match at least one token.
                criteria.text.is_none()
                    || text_scores.contains_key(id)
                    || criteria.filters.is_empty() && vector_scores.contains_key(id)
            })
            .map(|id| {
                let score = text_scores.get(&id).copied().unwrap_or(0.0)
                    + vector_scores.get(&id).copied().unwrap_or(0.0)
                    + if criteria.filters.is_empty() { 0.0 } else { 1.0 };
                let metadata = inner.docs.get(&id).cloned().unwrap_or_default();
                SearchHit {
                    id,
                    metadata,
                    score,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        let hits: Vec<SearchHit> = hits
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect();
        Ok(hits)
    }

    async fn indexed_fields(&self) -> Result<HashSet<String>, BackendError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.indexes.keys().cloned().collect())
    }

    async fn prune_empty(&self) -> Result<Vec<String>, BackendError> {
        let mut inner = self.inner.write().unwrap();
        let empty: Vec<String> = inner
            .indexes
            .iter()
            .filter(|(_, index)| index.is_unused())
            .map(|(field, _)| field.clone())
            .collect();
        for field in &empty {
            inner.indexes.remove(field);
            debug!(field = %field, "Dropped empty field index");
        }
        Ok(empty)
    }
}
