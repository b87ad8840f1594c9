//! Vector store error types.

use thiserror::Error;
use tl_connectors::ConnectorError;

/// Errors that can occur during vector store operations.
#[derive(Debug, Error, Clone)]
pub enum VectorStoreError {
    /// The index (or its data-plane host) could not be found.
    #[error("index not found: {0}")]
    IndexNotFound(String),

    /// Vector or index dimension does not match the configured dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// Operation timed out.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Rate limit exceeded.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Malformed response from the store.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration error; fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A write batch failed after earlier batches were committed.
    #[error("batch {failed_batch} of {total_batches} failed after {committed} vectors were committed: {source_message}")]
    PartialBatchFailure {
        failed_batch: usize,
        total_batches: usize,
        committed: usize,
        source_message: String,
    },

    /// Internal error from the store.
    #[error("internal error: {0}")]
    Internal(String),
}

impl VectorStoreError {
    /// Whether retrying the operation could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VectorStoreError::Connection(_)
                | VectorStoreError::Timeout(_)
                | VectorStoreError::RateLimited(_)
        )
    }
}

impl From<ConnectorError> for VectorStoreError {
    fn from(e: ConnectorError) -> Self {
        match e {
            ConnectorError::NotFound(msg) => VectorStoreError::IndexNotFound(msg),
            ConnectorError::RateLimited(secs) => VectorStoreError::RateLimited(secs),
            ConnectorError::ConnectionFailed(msg) => VectorStoreError::Connection(msg),
            ConnectorError::Timeout(msg) => VectorStoreError::Timeout(msg),
            ConnectorError::InvalidResponse(msg) => VectorStoreError::InvalidResponse(msg),
            ConnectorError::ConfigError(msg) => VectorStoreError::Configuration(msg),
            other => VectorStoreError::Internal(other.to_string()),
        }
    }
}

/// Result type for vector store operations.
pub type VectorStoreResult<T> = Result<T, VectorStoreError>;
