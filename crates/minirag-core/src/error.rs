//! Error types for minirag

use thiserror::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the indexing and retrieval pipeline
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Embedding provider error: {0}")]
    Embedding(String),

    #[error("Generation provider error: {0}")]
    Generation(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Chunk store error: {0}")]
    ChunkStore(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Dimension mismatch in collection {collection}: expected {expected}, got {actual}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    #[error("Partial insert into {collection}: {committed} of {total} records committed before failure: {reason}")]
    PartialInsert {
        collection: String,
        committed: usize,
        total: usize,
        reason: String,
    },

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Empty response: {0}")]
    EmptyResponse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

/// Coarse classification of an [`Error`], so callers can tell a
/// misconfigured process from a flaky backend or bad input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Model or backend not configured; retrying will not help.
    Configuration,
    /// Network or backend failure; the caller may retry.
    Transient,
    /// The request itself was wrong (lengths, dimensions, missing collection).
    Precondition,
    /// The backend answered but produced nothing usable.
    Empty,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::CollectionNotFound(_)
            | Error::DimensionMismatch { .. }
            | Error::InvalidInput(_)
            | Error::Processing(_) => ErrorKind::Precondition,
            Error::EmptyResponse(_) => ErrorKind::Empty,
            Error::Embedding(_)
            | Error::Generation(_)
            | Error::VectorStore(_)
            | Error::ChunkStore(_)
            | Error::PartialInsert { .. }
            | Error::Network(_)
            | Error::Serialization(_)
            | Error::Io(_)
            | Error::Other(_) => ErrorKind::Transient,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            Error::Configuration("no model".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(Error::Network("reset".into()).kind(), ErrorKind::Transient);
        assert_eq!(
            Error::DimensionMismatch {
                collection: "collection_1".into(),
                expected: 3,
                actual: 4,
            }
            .kind(),
            ErrorKind::Precondition
        );
        assert_eq!(Error::EmptyResponse("x".into()).kind(), ErrorKind::Empty);
        assert!(Error::VectorStore("down".into()).is_transient());
        assert!(!Error::CollectionNotFound("c".into()).is_transient());
    }

    #[test]
    fn test_partial_insert_message() {
        let err = Error::PartialInsert {
            collection: "collection_7".into(),
            committed: 50,
            total: 120,
            reason: "timeout".into(),
        };
        assert_eq!(
            err.to_string(),
            "Partial insert into collection_7: 50 of 120 records committed before failure: timeout"
        );
    }
}
