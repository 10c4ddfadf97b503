//! Error types for document retrieval.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// What an embedding call was made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedTarget {
    /// The chunk at this position in split order
    Chunk(usize),
    Query,
}

impl fmt::Display for EmbedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbedTarget::Chunk(index) => write!(f, "chunk {index}"),
            EmbedTarget::Query => write!(f, "query"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The document file is missing, unreadable, or took too long to read.
    #[error("document unavailable at {}: {source}", .path.display())]
    DocumentUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The embedding provider failed (or timed out) for a chunk or the query.
    #[error("embedding failed for {target}")]
    EmbeddingFailed {
        target: EmbedTarget,
        #[source]
        source: anyhow::Error,
    },

    #[error("document produced no usable chunks")]
    NoChunksAvailable,

    /// Wraps any of the above when raised by the composed retrieval.
    #[error("retrieval failed: {0}")]
    RetrievalFailed(#[source] Box<RetrievalError>),
}

impl RetrievalError {
    pub fn embedding_failed(target: EmbedTarget, source: anyhow::Error) -> Self {
        RetrievalError::EmbeddingFailed { target, source }
    }

    /// Wrap as `RetrievalFailed`, leaving an already wrapped error alone.
    pub fn into_retrieval_failed(self) -> Self {
        match self {
            RetrievalError::RetrievalFailed(_) => self,
            other => RetrievalError::RetrievalFailed(Box::new(other)),
        }
    }

    /// The underlying failure kind, looking through `RetrievalFailed`.
    pub fn cause(&self) -> &RetrievalError {
        match self {
            RetrievalError::RetrievalFailed(inner) => inner.cause(),
            other => other,
        }
    }
}

/// Result type alias for retrieval operations
pub type Result<T> = std::result::Result<T, RetrievalError>;
