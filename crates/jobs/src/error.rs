//! Job error types

use thiserror::Error;
use vodum_shared::VodumError;

use crate::mailer::MailError;
use crate::plex::PlexError;

/// Errors that abort a job run.
/// Per-item failures are logged and skipped instead of surfacing here.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Plex error: {0}")]
    Plex(#[from] PlexError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for JobError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => JobError::NotFound("row not found".to_string()),
            other => JobError::Database(other.to_string()),
        }
    }
}

impl From<VodumError> for JobError {
    fn from(err: VodumError) -> Self {
        match err {
            VodumError::NotFound(msg) => JobError::NotFound(msg),
            VodumError::Validation(msg) => JobError::InvalidInput(msg),
            VodumError::Config(msg) => JobError::Config(msg),
            VodumError::Database(msg) | VodumError::Migration(msg) => JobError::Database(msg),
            VodumError::Internal(msg) => JobError::Internal(msg),
        }
    }
}

pub type JobResult<T> = Result<T, JobError>;
