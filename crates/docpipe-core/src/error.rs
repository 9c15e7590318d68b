use std::time::Duration;

use thiserror::Error;

/// Top-level error type for the docpipe pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("model {0} is not loaded")]
    ModelNotLoaded(String),

    #[error("unknown model name: {0}")]
    UnknownModel(String),

    #[error("model load failed: {0}")]
    LoadError(String),

    #[error("inference failed: {0}")]
    InferenceError(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("step timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Only transport-class failures are ever retried, and only by the
    /// orchestrator. Validation and inference-logic errors surface immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Transport(_) | PipelineError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
