//! Error taxonomy shared by the HTTP and streaming paths.
//!
//! Adapters report failures as plain `anyhow::Error`s. The ingestion
//! pipeline and the query orchestrator classify them into a [`RagError`]
//! at their boundary so callers can map each kind to a status code or a
//! stream `error` event.

use thiserror::Error;

/// Failures surfaced by ingestion and query orchestration.
#[derive(Error, Debug)]
pub enum RagError {
    /// The document's extension is not one the loader understands.
    #[error("unsupported file type: {extension}")]
    UnsupportedFormat { extension: String },

    /// The document could not be read or its text could not be extracted.
    #[error("document load failed: {0}")]
    Load(String),

    /// The vector index was unreachable or the query against it failed.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// The text-generation provider failed.
    #[error("generation failed: {0}")]
    Generation(String),

    /// An inbound session message could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl RagError {
    pub fn retrieval(err: impl std::fmt::Display) -> Self {
        RagError::Retrieval(err.to_string())
    }

    pub fn generation(err: impl std::fmt::Display) -> Self {
        RagError::Generation(err.to_string())
    }

    /// Whether the caller (rather than the system) can fix this failure.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            RagError::UnsupportedFormat { .. } | RagError::Protocol(_)
        )
    }
}
