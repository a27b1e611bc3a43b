//! Store error types.

use thiserror::Error;

/// Callers branch on `NotFound` (an expected outcome, e.g. HTTP 404) versus
/// everything else (an error, e.g. HTTP 500).
#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("stored row could not be decoded: {0}")]
    Decode(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Decode(err.to_string())
    }
}
