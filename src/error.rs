//! Error types
//!
//! Only validation, generation and transport failures end a request.
//! Parse degradation, skipped steps and sweep warnings are logged and never
//! surface as `AdvisorError` values.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors that terminate an analysis request (or a CLI command)
#[derive(Debug, Error)]
pub enum AdvisorError {
    /// Bad upload type or size, rejected before any network call
    #[error("invalid upload: {0}")]
    Validation(String),

    /// Single-shot visualization produced no image
    #[error("image generation failed: {0}")]
    GenerationFailure(String),

    /// Network or API failure talking to the generative model
    #[error("model request failed: {0}")]
    Transport(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("request cancelled")]
    Cancelled,

    /// Failure to persist a generated image or upload
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AdvisorError {
    /// HTTP status reported to the client for this error
    pub fn status(&self) -> StatusCode {
        match self {
            AdvisorError::Validation(_) => StatusCode::BAD_REQUEST,
            AdvisorError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for AdvisorError {
    fn from(err: reqwest::Error) -> Self {
        AdvisorError::Transport(err.to_string())
    }
}

impl From<figment::Error> for AdvisorError {
    fn from(err: figment::Error) -> Self {
        AdvisorError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AdvisorError>;
