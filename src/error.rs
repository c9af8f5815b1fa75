//! Error taxonomy for the answering engine.
//!
//! Variants map to the failure classes the pipeline distinguishes:
//! validation failures are rejected at the boundary and never retried,
//! duplicate events are swallowed and logged, provider errors are
//! transient and retried with bounded backoff, and storage errors are
//! fatal for the current request.

use thiserror::Error;

/// Errors that can occur across the ingestion and answering pipeline.
#[derive(Debug, Error)]
pub enum DeskError {
    /// Malformed input, rejected at the boundary. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// A replayed inbound event. Swallowed internally, never user-visible.
    #[error("duplicate event: {0}")]
    DuplicateEvent(String),

    /// Embedding provider failure (transient, retried with backoff).
    #[error("embedding provider error: {0}")]
    EmbeddingProvider(String),

    /// Language model provider failure (transient, retried with backoff).
    #[error("llm provider error: {0}")]
    LlmProvider(String),

    /// Database failure. Fatal for the current request.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for DeskError {
    fn from(e: sqlx::Error) -> Self {
        DeskError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for DeskError {
    fn from(e: serde_json::Error) -> Self {
        DeskError::Storage(format!("serialization: {}", e))
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, DeskError>;
