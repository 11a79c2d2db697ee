//! Job configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{JobError, JobResult};

pub const DEFAULT_DATABASE_URL: &str = "sqlite:///app/appdata/database.db";
pub const DEFAULT_PLEX_TV_URL: &str = "https://plex.tv";

/// Paths, endpoints and pacing for the jobs.
/// Feature toggles (reminders, revocation, unfriend delay) live in the settings table.
#[derive(Debug, Clone)]
pub struct JobsConfig {
    /// SQLite URL, also used to locate the file for backups
    pub database_url: String,
    /// Plex.tv base URL
    pub plex_tv_url: String,
    pub backup_dir: PathBuf,
    pub temp_dir: PathBuf,
    /// Number of backups kept after rotation
    pub backup_retention: usize,
    /// Files in the temp dir older than this are deleted
    pub temp_max_age: Duration,
    /// Pause between two reminder sends
    pub reminder_send_delay: Duration,
    /// Pause between two campaign sends
    pub mail_queue_delay: Duration,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            plex_tv_url: DEFAULT_PLEX_TV_URL.to_string(),
            backup_dir: PathBuf::from("/app/appdata/backup"),
            temp_dir: PathBuf::from("/app/appdata/temp"),
            backup_retention: 7,
            temp_max_age: Duration::from_secs(24 * 3600),
            reminder_send_delay: Duration::from_secs(30),
            mail_queue_delay: Duration::from_millis(200),
        }
    }
}

impl JobsConfig {
    /// Create config from environment variables, falling back to defaults
    pub fn from_env() -> JobResult<Self> {
        let defaults = Self::default();

        let backup_retention = parse_var::<usize>("BACKUP_RETENTION")?.unwrap_or(defaults.backup_retention);
        if backup_retention == 0 {
            return Err(JobError::Config(
                "BACKUP_RETENTION must be at least 1".to_string(),
            ));
        }

        let temp_max_age = match parse_var::<u64>("TEMP_MAX_AGE_HOURS")? {
            Some(hours) => hours
                .checked_mul(3600)
                .map(Duration::from_secs)
                .ok_or_else(|| JobError::Config("TEMP_MAX_AGE_HOURS is too large".to_string()))?,
            None => defaults.temp_max_age,
        };

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            plex_tv_url: std::env::var("PLEX_TV_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.plex_tv_url),
            backup_dir: std::env::var("BACKUP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.backup_dir),
            temp_dir: std::env::var("TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_dir),
            backup_retention,
            temp_max_age,
            reminder_send_delay: parse_var::<u64>("REMINDER_SEND_DELAY_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.reminder_send_delay),
            mail_queue_delay: parse_var::<u64>("MAIL_QUEUE_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.mail_queue_delay),
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str) -> JobResult<Option<T>> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| JobError::Config(format!("{} must be a non-negative integer", name))),
        _ => Ok(None),
    }
}
