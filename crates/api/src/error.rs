//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use vodum_jobs::JobError;
use vodum_shared::VodumError;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Resource not found")]
    NotFound,
    #[error("Resource already exists")]
    Conflict(String),

    /// Plex, Tautulli or SMTP answered with an error
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),

            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),

            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),

            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg.clone()),

            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR", "Database error".to_string()),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", self.to_string()),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound,
            sqlx::Error::Database(db_err) => {
                // SQLite UNIQUE and PRIMARY KEY constraint failures
                if matches!(db_err.code().as_deref(), Some("2067") | Some("1555")) {
                    return ApiError::Conflict("Resource already exists".to_string());
                }
                ApiError::Database(db_err.to_string())
            }
            _ => ApiError::Database(err.to_string()),
        }
    }
}

impl From<VodumError> for ApiError {
    fn from(err: VodumError) -> Self {
        match err {
            VodumError::NotFound(_) => ApiError::NotFound,
            VodumError::Validation(msg) => ApiError::Validation(msg),
            VodumError::Database(msg) | VodumError::Migration(msg) => ApiError::Database(msg),
            VodumError::Config(msg) | VodumError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                ApiError::Internal
            }
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Database(msg) => ApiError::Database(msg),
            JobError::NotFound(_) => ApiError::NotFound,
            JobError::InvalidInput(msg) | JobError::Config(msg) => ApiError::Validation(msg),
            JobError::Plex(e) => ApiError::Upstream(e.to_string()),
            JobError::Mail(e) => ApiError::Upstream(e.to_string()),
            JobError::Io(e) => {
                tracing::error!(error = %e, "IO error");
                ApiError::Internal
            }
            JobError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                ApiError::Internal
            }
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
