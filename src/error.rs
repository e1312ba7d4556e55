//! Pipeline error taxonomy.
//!
//! Each variant carries enough context to decide, at the call site, whether the
//! operation is worth retrying. Transient network failures, rate limits, storage
//! and encoder I/O are retryable; validation, rendering, and over-limit blocks
//! are terminal for the affected document.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Network-level failure (timeout, connection reset, 5xx). Retried with backoff.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// HTTP 429 or an explicit rate-limit signal. Retried, honoring the
    /// server-advised delay when one was sent.
    #[error("rate limited by server")]
    RateLimited { retry_after: Option<Duration> },

    /// Bad hash, structural signature, or declared-size mismatch. Never retried.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// The external renderer failed to produce markdown. Surfaced, not retried.
    #[error("renderer failed: {0}")]
    Render(String),

    /// A single atomic block exceeds the encoder's hard token limit. Fatal for
    /// the document: splitting it would corrupt a table or equation.
    #[error("block of {tokens} tokens exceeds encoder maximum of {max_tokens}")]
    ChunkSizeExceeded { tokens: usize, max_tokens: usize },

    /// Content store or vector index I/O failure. Retried a bounded number of
    /// times, then fatal for the document.
    #[error("storage error: {0}")]
    Storage(String),

    /// Embedding collaborator failure. Retried like storage.
    #[error("encoder failed: {0}")]
    Encoder(String),

    /// The per-document pipeline deadline elapsed.
    #[error("document deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
}

impl PipelineError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::TransientNetwork(_)
                | PipelineError::RateLimited { .. }
                | PipelineError::Storage(_)
                | PipelineError::Encoder(_)
        )
    }

    /// Stable machine-readable code for the processing log.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::TransientNetwork(_) => "transient_network",
            PipelineError::RateLimited { .. } => "rate_limited",
            PipelineError::ValidationFailed(_) => "validation_failed",
            PipelineError::Render(_) => "render_error",
            PipelineError::ChunkSizeExceeded { .. } => "chunk_size_exceeded",
            PipelineError::Storage(_) => "storage_error",
            PipelineError::Encoder(_) => "encoder_error",
            PipelineError::DeadlineExceeded(_) => "deadline_exceeded",
        }
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(e: sqlx::Error) -> Self {
        PipelineError::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        PipelineError::TransientNetwork(e.to_string())
    }
}
