//! Error taxonomy for retrieval, index construction, and generation.

use thiserror::Error;

/// Conditions surfaced synchronously by the retrieval path.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RetrievalError {
    /// Blank query, non-positive `k`, or a malformed domain filter.
    #[error("{0}")]
    InvalidInput(String),

    /// The domain filter names a domain the registry does not know.
    #[error("invalid domain '{domain}'. Valid domains: {}", .known.join(", "))]
    UnknownDomain { domain: String, known: Vec<String> },

    /// The domain is registered but no index was loaded for it.
    #[error("domain '{0}' is registered but its index is not loaded")]
    UnavailableDomain(String),

    /// The embedding collaborator failed to vectorize the query.
    #[error("failed to embed query: {0}")]
    Embedding(String),
}

/// Violations of the index/metadata alignment invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("index holds {vectors} vectors but {passages} passages")]
    LengthMismatch { vectors: usize, passages: usize },

    #[error("vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("vectors must have at least one dimension")]
    EmptyVector,
}

/// Failure modes of a generation call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    /// The provider answered with a non-success HTTP status.
    #[error("generation provider returned status {status}")]
    Status { status: u16, body: String },

    #[error("generation request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("generation transport error: {0}")]
    Transport(String),

    #[error("invalid generation response: {0}")]
    InvalidResponse(String),

    #[error("generation provider is disabled")]
    Disabled,
}

impl GenerationError {
    /// Short user-facing diagnostic used as the answer text on failure.
    pub fn diagnostic(&self) -> String {
        match self {
            GenerationError::Status { status, .. } => {
                format!("Error generating response: {status}")
            }
            GenerationError::Timeout { .. } => {
                "Error: Request timed out. Please try again.".to_string()
            }
            GenerationError::Transport(msg) | GenerationError::InvalidResponse(msg) => {
                format!("Error calling LLM: {msg}")
            }
            GenerationError::Disabled => {
                "Error calling LLM: answer generation is disabled".to_string()
            }
        }
    }
}
