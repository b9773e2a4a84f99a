//! Error types for pipeline execution
//!
//! Errors are classified by recoverability:
//! - Retryable: storage faults, network issues, timeouts
//! - NonRetryable: configuration errors
//!
//! Extraction-service faults never propagate out of the extraction engine
//! (the deterministic fallback absorbs them); they only appear here so the
//! HTTP client and the engine can talk about what went wrong.

use thiserror::Error;

/// Error types for pipeline execution
#[derive(Debug, Error)]
pub enum PipelineError {
    // Retryable errors
    #[error("Extraction service error: {0}")]
    Service(String),

    #[error("Extraction service timed out after {0} seconds")]
    ServiceTimeout(u64),

    #[error("Storage error: {0}")]
    Storage(String),

    // Non-retryable errors
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl PipelineError {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Service(_)
                | PipelineError::ServiceTimeout(_)
                | PipelineError::Storage(_)
        )
    }
}
