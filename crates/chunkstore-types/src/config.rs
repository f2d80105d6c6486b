//! Configuration loading for chunkstore.
//!
//! Layered: defaults -> optional config file -> `CHUNKSTORE_*` env vars.

use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::ChunkStoreError;

/// Store-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// TTL applied to record, array, and embedding-backup keys on every
    /// write. 0 disables expiry.
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Page size for cursor scans. Bounds keys per round-trip.
    #[serde(default = "default_scan_page_size")]
    pub scan_page_size: usize,

    /// Required embedding dimension. None accepts the first dimension seen
    /// per batch.
    #[serde(default)]
    pub embedding_dimension: Option<usize>,

    /// Re-read both stores' counts after each write operation and warn on
    /// delta mismatch.
    #[serde(default = "default_true")]
    pub verify_counts: bool,
}

fn default_ttl_seconds() -> u64 {
    2_592_000 // 30 days
}

fn default_scan_page_size() -> usize {
    200
}

fn default_true() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            scan_page_size: default_scan_page_size(),
            embedding_dimension: None,
            verify_counts: default_true(),
        }
    }
}

impl StoreConfig {
    /// Load configuration from an optional TOML file with `CHUNKSTORE_*`
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ChunkStoreError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(Environment::with_prefix("CHUNKSTORE").try_parsing(true));

        let config: StoreConfig = builder
            .build()
            .map_err(|e| ChunkStoreError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| ChunkStoreError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ChunkStoreError> {
        if self.scan_page_size == 0 {
            return Err(ChunkStoreError::Config(
                "scan_page_size must be > 0".to_string(),
            ));
        }
        if self.embedding_dimension == Some(0) {
            return Err(ChunkStoreError::Config(
                "embedding_dimension must be > 0 when set".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.ttl_seconds, 2_592_000);
        assert_eq!(config.scan_page_size, 200);
        assert_eq!(config.embedding_dimension, None);
        assert!(config.verify_counts);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let config = StoreConfig {
            scan_page_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "ttl_seconds = 60\nscan_page_size = 10\nembedding_dimension = 128"
        )
        .unwrap();

        let config = StoreConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.ttl_seconds, 60);
        assert_eq!(config.scan_page_size, 10);
        assert_eq!(config.embedding_dimension, Some(128));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = StoreConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let decoded: StoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.scan_page_size, config.scan_page_size);
    }
}
