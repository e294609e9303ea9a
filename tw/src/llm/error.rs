//! Provider error types

use std::time::Duration;
use thiserror::Error;

use crate::domain::{FailureReason, TaskError};

/// Errors that can occur during provider calls
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ProviderError> for TaskError {
    fn from(err: ProviderError) -> Self {
        let reason = match err {
            ProviderError::Timeout(_) => FailureReason::Timeout,
            _ => FailureReason::ProviderError,
        };
        TaskError::failure(reason, err.to_string())
    }
}
