//! Error types shared across the pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid transition: job is {status}, expected {expected}")]
    InvalidTransition { status: String, expected: String },

    #[error("stage {stage} failed: {message}")]
    StageFailed { stage: String, message: String },

    #[error("upstream service error: {0}")]
    Upstream(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
