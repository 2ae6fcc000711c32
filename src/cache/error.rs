//! Error types for cache operations.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Wildcards are only allowed at the start and/or end of a pattern.
    #[error("invalid key pattern `{0}`: `*` is only allowed at the start or end")]
    InvalidKeyPattern(String),

    /// A scalar-only write received an array or object.
    #[error("value for key `{key}` must be a scalar, got {kind}")]
    NonScalarValue { key: String, kind: &'static str },

    /// The adapter cannot perform this operation.
    #[error("{adapter} does not support {operation}")]
    Unsupported {
        adapter: &'static str,
        operation: &'static str,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}
