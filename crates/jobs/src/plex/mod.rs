//! Plex.tv and Plex Media Server client

mod client;
mod types;
pub mod xml;

pub use client::PlexClient;
pub use types::*;

/// Error type for Plex calls
#[derive(Debug, thiserror::Error)]
pub enum PlexError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Plex returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Invalid XML payload: {0}")]
    Xml(String),

    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl PlexError {
    /// Returns true if this error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            PlexError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            PlexError::Status { status, .. } => *status == 429 || *status >= 500,
            PlexError::Xml(_) | PlexError::Json(_) | PlexError::NotFound(_) => false,
        }
    }
}

pub type PlexResult<T> = Result<T, PlexError>;
