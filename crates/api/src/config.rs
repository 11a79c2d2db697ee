//! API configuration

use std::env;

use vodum_jobs::config::DEFAULT_DATABASE_URL;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:5000";

/// Shortest accepted admin token
pub const MIN_ADMIN_TOKEN_LEN: usize = 32;

/// API configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub database_url: String,
    /// Bearer token required on every `/api/v1` route
    pub admin_api_token: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_address: env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            admin_api_token: {
                let token = env::var("ADMIN_API_TOKEN")
                    .map_err(|_| ConfigError::Missing("ADMIN_API_TOKEN"))?;
                let token = token.trim().to_string();
                if token.len() < MIN_ADMIN_TOKEN_LEN {
                    return Err(ConfigError::WeakSecret(
                        "ADMIN_API_TOKEN must be at least 32 characters",
                    ));
                }
                token
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}
