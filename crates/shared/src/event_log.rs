//! Persistent job log, shown in the panel's log view

use sqlx::SqlitePool;

use crate::dates::now_rfc3339;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// Format stored in `logs.event`
pub fn format_event(level: LogLevel, message: &str) -> String {
    format!("[{}] {}", level.as_str(), message)
}

/// Append a line to the `logs` table.
/// Failures are traced and swallowed so logging never fails a job.
pub async fn record_event(pool: &SqlitePool, level: LogLevel, message: &str) {
    let result = sqlx::query("INSERT INTO logs (event, timestamp) VALUES (?1, ?2)")
        .bind(format_event(level, message))
        .bind(now_rfc3339())
        .execute(pool)
        .await;

    if let Err(e) = result {
        tracing::warn!(error = %e, "Failed to persist log event");
    }
}
