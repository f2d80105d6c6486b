//! Key schema for the metadata store.
//!
//! Layout:
//! - `record:{id}` — hash of scalar fields plus store bookkeeping
//! - `{field}:{id}` — list per array field
//! - `embedding:{id}` — raw backup of the record's vector
//! - `index_pos:{position}` — hash binding a vector position to its id
//!
//! All key construction and parsing goes through this module; nothing else
//! concatenates key strings.

pub const RECORD_PREFIX: &str = "record";
pub const EMBEDDING_PREFIX: &str = "embedding";
pub const POSITION_PREFIX: &str = "index_pos";

/// A parsed store key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKey {
    Record { id: String },
    Embedding { id: String },
    Position { position: u64 },
    Array { field: String, id: String },
}

impl StoreKey {
    /// Encode to the stored key string.
    pub fn encode(&self) -> String {
        match self {
            StoreKey::Record { id } => format!("{RECORD_PREFIX}:{id}"),
            StoreKey::Embedding { id } => format!("{EMBEDDING_PREFIX}:{id}"),
            StoreKey::Position { position } => format!("{POSITION_PREFIX}:{position}"),
            StoreKey::Array { field, id } => format!("{field}:{id}"),
        }
    }

    /// Parse a stored key string. Returns None for keys outside the schema.
    pub fn parse(key: &str) -> Option<StoreKey> {
        let (prefix, rest) = key.split_once(':')?;
        if rest.is_empty() {
            return None;
        }
        match prefix {
            RECORD_PREFIX => Some(StoreKey::Record {
                id: rest.to_string(),
            }),
            EMBEDDING_PREFIX => Some(StoreKey::Embedding {
                id: rest.to_string(),
            }),
            POSITION_PREFIX => rest
                .parse::<u64>()
                .ok()
                .map(|position| StoreKey::Position { position }),
            field => Some(StoreKey::Array {
                field: field.to_string(),
                id: rest.to_string(),
            }),
        }
    }
}

/// `record:{id}`
pub fn record_key(id: &str) -> String {
    StoreKey::Record { id: id.to_string() }.encode()
}

/// `embedding:{id}`
pub fn embedding_key(id: &str) -> String {
    StoreKey::Embedding { id: id.to_string() }.encode()
}

/// `index_pos:{position}`
pub fn position_key(position: u64) -> String {
    StoreKey::Position { position }.encode()
}

/// `{field}:{id}`
pub fn array_key(field: &str, id: &str) -> String {
    StoreKey::Array {
        field: field.to_string(),
        id: id.to_string(),
    }
    .encode()
}

/// Scan pattern matching every record hash.
pub fn record_pattern() -> String {
    format!("{RECORD_PREFIX}:*")
}

/// Scan pattern matching every key owned by `id` (record hash, array
/// lists, embedding backup).
pub fn id_pattern(id: &str) -> String {
    format!("*:{id}")
}

/// Scan pattern matching every position binding.
pub fn position_pattern() -> String {
    format!("{POSITION_PREFIX}:*")
}

/// Extract the record id from a `record:{id}` key.
pub fn id_from_record_key(key: &str) -> Option<&str> {
    key.strip_prefix(RECORD_PREFIX)
        .and_then(|rest| rest.strip_prefix(':'))
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_parse_roundtrip() {
        let keys = vec![
            StoreKey::Record {
                id: "chunk-1".to_string(),
            },
            StoreKey::Embedding {
                id: "chunk-1".to_string(),
            },
            StoreKey::Position { position: 42 },
            StoreKey::Array {
                field: "tags".to_string(),
                id: "chunk-1".to_string(),
            },
        ];
        for key in keys {
            let encoded = key.encode();
            assert_eq!(StoreKey::parse(&encoded), Some(key));
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(StoreKey::parse("no-separator"), None);
        assert_eq!(StoreKey::parse("record:"), None);
        assert_eq!(StoreKey::parse("index_pos:not-a-number"), None);
    }

    #[test]
    fn test_id_from_record_key() {
        assert_eq!(id_from_record_key("record:chunk-1"), Some("chunk-1"));
        assert_eq!(id_from_record_key("embedding:chunk-1"), None);
        assert_eq!(id_from_record_key("record:"), None);
    }

    #[test]
    fn test_patterns() {
        assert_eq!(record_pattern(), "record:*");
        assert_eq!(id_pattern("chunk-1"), "*:chunk-1");
    }

    #[test]
    fn test_id_pattern_covers_owned_keys() {
        use chunkstore_adapters::memory_store::glob_match;

        let pattern = id_pattern("chunk-1");
        assert!(glob_match(&pattern, &record_key("chunk-1")));
        assert!(glob_match(&pattern, &embedding_key("chunk-1")));
        assert!(glob_match(&pattern, &array_key("tags", "chunk-1")));
        assert!(!glob_match(&pattern, &record_key("chunk-2")));
    }
}
