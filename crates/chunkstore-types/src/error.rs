//! Error types for chunkstore operations.

use thiserror::Error;

/// Source error boxed for transport across store boundaries.
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for chunkstore operations.
///
/// Consistency-count mismatches are deliberately not represented here: they
/// are logged as warnings after the operation settles and never abort it.
#[derive(Debug, Error)]
pub enum ChunkStoreError {
    /// A required collaborator is not configured. Raised before any I/O.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Invalid input shape. Raised before any I/O.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A record could not be flattened to its stored form.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metadata store transport failure, tagged with the failing operation.
    #[error("Store operation '{op}' failed: {source}")]
    StoreOperation {
        op: String,
        #[source]
        source: BoxedSource,
    },

    /// Vector index transport failure, tagged with the failing operation.
    #[error("Index operation '{op}' failed: {source}")]
    IndexOperation {
        op: String,
        #[source]
        source: BoxedSource,
    },

    /// Catch-all wrapper. Always carries the original cause.
    #[error("Unexpected error: {source}")]
    Unexpected {
        #[source]
        source: BoxedSource,
    },
}

impl ChunkStoreError {
    /// Create a service-unavailable error naming the missing collaborator.
    pub fn unavailable(what: impl Into<String>) -> Self {
        Self::ServiceUnavailable(what.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Wrap a metadata store failure with the operation name.
    pub fn store_op(op: impl Into<String>, source: impl Into<BoxedSource>) -> Self {
        Self::StoreOperation {
            op: op.into(),
            source: source.into(),
        }
    }

    /// Wrap a vector index failure with the operation name.
    pub fn index_op(op: impl Into<String>, source: impl Into<BoxedSource>) -> Self {
        Self::IndexOperation {
            op: op.into(),
            source: source.into(),
        }
    }

    /// Wrap an unclassified failure.
    pub fn unexpected(source: impl Into<BoxedSource>) -> Self {
        Self::Unexpected {
            source: source.into(),
        }
    }
}
