//! Search criteria and results for the query facade.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::record::FieldValue;

/// Kind of secondary index kept for a scalar field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    /// Tokenized free-text index.
    Text,
    /// Range/equality index over numbers.
    Numeric,
    /// Exact-match index over opaque values.
    Tag,
}

impl IndexKind {
    /// Index kind used for a newly observed field value.
    pub fn for_value(value: &FieldValue) -> Self {
        match value {
            FieldValue::Str(_) => IndexKind::Text,
            FieldValue::Int(_) | FieldValue::Num(_) => IndexKind::Numeric,
            FieldValue::Bool(_) => IndexKind::Tag,
        }
    }
}

/// What to match. At least one of the three dimensions must be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchCriteria {
    /// Free-text query over text-indexed fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Query embedding for similarity ranking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,

    /// Exact structured filters, all of which must match.
    #[serde(default)]
    pub filters: HashMap<String, FieldValue>,
}

impl SearchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    /// True when no dimension is specified at all.
    pub fn is_empty(&self) -> bool {
        self.text.as_deref().map_or(true, |t| t.trim().is_empty())
            && self.vector.is_none()
            && self.filters.is_empty()
    }
}

/// A ranked search match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    /// Scalar fields of the matched record as known to the index.
    pub metadata: HashMap<String, FieldValue>,
    /// Higher is better.
    pub score: f32,
}

impl SearchHit {
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            metadata: HashMap::new(),
            score,
        }
    }
}
