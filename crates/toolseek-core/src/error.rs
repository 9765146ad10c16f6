use thiserror::Error;

use crate::types::Collection;

/// Failure reported by an embedding provider.
///
/// `Transient` failures (timeouts, dropped connections, rate limits, 5xx)
/// may succeed on retry; `Permanent` ones will not.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmbedError {
    #[error("transient embedding failure: {0}")]
    Transient(String),

    #[error("permanent embedding failure: {0}")]
    Permanent(String),
}

impl EmbedError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(#[from] EmbedError),

    #[error("Unsupported retrieval method: {0}")]
    UnsupportedMethod(String),

    #[error("Unsupported fusion strategy: {0}")]
    UnsupportedStrategy(String),

    #[error("Invalid fusion weights: {0}")]
    InvalidWeights(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid tool descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Malformed document '{id}': {reason}")]
    MalformedDocument { id: String, reason: String },

    #[error("'{id}' already exists in the {collection} collection, use update instead")]
    Conflict { collection: Collection, id: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Store failure: {0}")]
    Store(String),

    #[error("Index failure: {0}")]
    Index(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
