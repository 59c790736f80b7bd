//! Vector index error types.

use thiserror::Error;

/// Errors that can occur during vector operations.
#[derive(Debug, Error)]
pub enum VectorError {
    /// Index server could not be reached or refused service
    #[error("Index unavailable: {0}")]
    Unavailable(String),

    /// Query exceeded its deadline
    #[error("Index query timed out")]
    Timeout,

    /// Index answered with an error
    #[error("Query error: {0}")]
    Query(String),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Duplicate document id while building an in-memory index
    #[error("Duplicate document id: {0}")]
    DuplicateId(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Embedding error while preparing documents
    #[error("Embedding error: {0}")]
    Embedding(#[from] insight_embeddings::EmbeddingError),
}

impl From<reqwest::Error> for VectorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            VectorError::Timeout
        } else if e.is_connect() || e.is_request() {
            VectorError::Unavailable(e.to_string())
        } else {
            VectorError::Query(e.to_string())
        }
    }
}
