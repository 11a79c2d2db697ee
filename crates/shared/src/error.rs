//! Error types for Vodum

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VodumError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for VodumError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => VodumError::NotFound("row not found".to_string()),
            other => VodumError::Database(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for VodumError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        VodumError::Migration(err.to_string())
    }
}

pub type VodumResult<T> = Result<T, VodumError>;
