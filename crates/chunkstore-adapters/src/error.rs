//! Backend transport errors.

use thiserror::Error;

/// Errors surfaced by a single backend.
///
/// The consistency layer wraps these with the failing operation name; this
/// type only describes what went wrong inside the backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// A key holds a value of a different shape than the operation expects.
    #[error("wrong value type at key '{key}': expected {expected}")]
    WrongType { key: String, expected: &'static str },

    /// Vector dimensionality does not match the index.
    #[error("dimension mismatch: index holds {expected}, got {got}")]
    Dimension { expected: usize, got: usize },

    /// The backend does not support the requested operation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Transport or engine failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl BackendError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    pub fn wrong_type(key: impl Into<String>, expected: &'static str) -> Self {
        Self::WrongType {
            key: key.into(),
            expected,
        }
    }
}
