//! Record model and flattening to the stored representation.
//!
//! A record is persisted as one hash of JSON-encoded scalar values plus one
//! list per array field. `FlatRecord` is that stored shape; flattening and
//! decoding are the only places that know the encoding.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ChunkStoreError;

/// Field names the store manages itself. User fields may not shadow them.
pub const RESERVED_FIELDS: &[&str] = &["deleted", "index_position", "updated_at"];

/// Array field names that would collide with the key namespace.
pub const RESERVED_ARRAY_FIELDS: &[&str] = &["record", "embedding", "index_pos"];

/// Scalar field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Num(f64),
    Bool(bool),
}

impl FieldValue {
    /// Encode to the stored string form (JSON).
    pub fn to_stored(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decode from the stored string form.
    pub fn from_stored(raw: &str) -> Result<Self, ChunkStoreError> {
        serde_json::from_str(raw)
            .map_err(|e| ChunkStoreError::serialization(format!("bad stored value {raw:?}: {e}")))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Num(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

/// A chunk record.
///
/// `deleted` and `index_position` are owned by the orchestrator; callers set
/// fields, arrays, and the optional embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique record id.
    pub id: String,

    /// Scalar fields.
    #[serde(default)]
    pub fields: HashMap<String, FieldValue>,

    /// Ordered array fields.
    #[serde(default)]
    pub arrays: HashMap<String, Vec<String>>,

    /// Optional fixed-dimension embedding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Soft-delete flag.
    #[serde(default)]
    pub deleted: bool,

    /// Position of this record's vector in the vector index, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_position: Option<u64>,

    /// Last write stamp in epoch milliseconds, set by the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl Record {
    /// Create an empty record with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: HashMap::new(),
            arrays: HashMap::new(),
            embedding: None,
            deleted: false,
            index_position: None,
            updated_at: None,
        }
    }

    /// Set a scalar field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Set an array field.
    pub fn with_array(mut self, name: impl Into<String>, items: Vec<String>) -> Self {
        self.arrays.insert(name.into(), items);
        self
    }

    /// Set the embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Flatten to the stored representation.
    ///
    /// Rejects field names that shadow store-managed fields and array names
    /// that would collide with the key namespace.
    pub fn flatten(&self) -> Result<FlatRecord, ChunkStoreError> {
        let mut scalars = HashMap::with_capacity(self.fields.len());
        for (name, value) in &self.fields {
            if RESERVED_FIELDS.contains(&name.as_str()) {
                return Err(ChunkStoreError::serialization(format!(
                    "field name '{name}' is reserved"
                )));
            }
            scalars.insert(name.clone(), value.to_stored());
        }

        let mut arrays = HashMap::with_capacity(self.arrays.len());
        for (name, items) in &self.arrays {
            if name.is_empty() || RESERVED_ARRAY_FIELDS.contains(&name.as_str()) {
                return Err(ChunkStoreError::serialization(format!(
                    "array field name '{name}' is reserved"
                )));
            }
            if name.contains(':') {
                return Err(ChunkStoreError::serialization(format!(
                    "array field name '{name}' may not contain ':'"
                )));
            }
            arrays.insert(name.clone(), items.clone());
        }

        Ok(FlatRecord { scalars, arrays })
    }

    /// Rebuild a record from its stored hash and array lists.
    ///
    /// Store-managed fields are lifted out of the hash into their dedicated
    /// slots; everything else is decoded back into `fields`.
    pub fn from_stored(
        id: impl Into<String>,
        hash: &HashMap<String, String>,
        arrays: HashMap<String, Vec<String>>,
    ) -> Result<Self, ChunkStoreError> {
        let mut record = Record::new(id);
        record.arrays = arrays;

        for (name, raw) in hash {
            match name.as_str() {
                "deleted" => record.deleted = raw == "true",
                "index_position" => {
                    record.index_position = raw.parse::<u64>().ok();
                }
                "updated_at" => {
                    record.updated_at = raw.parse::<i64>().ok();
                }
                _ => {
                    record
                        .fields
                        .insert(name.clone(), FieldValue::from_stored(raw)?);
                }
            }
        }

        Ok(record)
    }
}

/// A record flattened to its stored shape: JSON-encoded scalar strings plus
/// raw array lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatRecord {
    pub scalars: HashMap<String, String>,
    pub arrays: HashMap<String, Vec<String>>,
}

/// Input accepted by upsert.
///
/// Explicit variants replace the source system's runtime shape sniffing: a
/// structured record, a bare field mapping, or an id alone.
#[derive(Debug, Clone)]
pub enum UpsertItem {
    /// A full record.
    Record(Record),
    /// Scalar fields for an id, no arrays or embedding.
    Fields {
        id: String,
        fields: HashMap<String, FieldValue>,
    },
    /// An id alone; upsert touches only the record hash and its TTL.
    Id(String),
}

impl UpsertItem {
    /// The record id this item addresses.
    pub fn id(&self) -> &str {
        match self {
            UpsertItem::Record(r) => &r.id,
            UpsertItem::Fields { id, .. } => id,
            UpsertItem::Id(id) => id,
        }
    }

    /// Normalize to a record.
    pub fn into_record(self) -> Record {
        match self {
            UpsertItem::Record(r) => r,
            UpsertItem::Fields { id, fields } => {
                let mut r = Record::new(id);
                r.fields = fields;
                r
            }
            UpsertItem::Id(id) => Record::new(id),
        }
    }
}

impl From<Record> for UpsertItem {
    fn from(record: Record) -> Self {
        UpsertItem::Record(record)
    }
}
