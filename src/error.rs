//! Errors returned to the host at construction time
//!
//! Everything that goes wrong after [`Pipeline::start`](crate::Pipeline::start)
//! is handled inside the worker and reported as a self-error instead.

use crate::event_store::StoreError;

/// Result type for pipeline construction
pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid {field}: {message}")]
    InvalidConfig { field: &'static str, message: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker thread failed to start: {0}")]
    Worker(String),
}

impl PipelineError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        PipelineError::InvalidConfig {
            field,
            message: message.into(),
        }
    }
}
