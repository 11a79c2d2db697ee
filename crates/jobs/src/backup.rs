//! Database backup with rotation

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use vodum_shared::event_log::{record_event, LogLevel};
use vodum_shared::{checkpoint, sqlite_path_from_url};

use crate::error::{JobError, JobResult};

const BACKUP_PREFIX: &str = "database_";
const BACKUP_SUFFIX: &str = ".db";

#[derive(Debug, Clone, Serialize)]
pub struct BackupSummary {
    pub path: PathBuf,
    pub removed: Vec<String>,
}

pub fn backup_file_name(now: chrono::DateTime<Utc>) -> String {
    format!("{}{}{}", BACKUP_PREFIX, now.format("%Y-%m-%d_%H%M%S"), BACKUP_SUFFIX)
}

/// Names beyond the `keep` newest, newest being the lexicographically greatest.
/// The newest backup is always kept.
pub fn select_for_rotation(mut names: Vec<String>, keep: usize) -> Vec<String> {
    names.sort_unstable_by(|a, b| b.cmp(a));
    names.into_iter().skip(keep.max(1)).collect()
}

async fn list_backups(dir: &Path) -> JobResult<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(BACKUP_PREFIX)
            && name.ends_with(BACKUP_SUFFIX)
            && entry.file_type().await?.is_file()
        {
            names.push(name);
        }
    }
    Ok(names)
}

/// Checkpoint the WAL, copy the database file and keep the newest `retention` copies
pub async fn backup_database(
    pool: &SqlitePool,
    database_url: &str,
    backup_dir: &Path,
    retention: usize,
) -> JobResult<BackupSummary> {
    let source = sqlite_path_from_url(database_url)
        .ok_or_else(|| JobError::Config("database URL has no file to back up".to_string()))?;

    if !tokio::fs::try_exists(&source).await? {
        record_event(pool, LogLevel::Error, "Backup failed: database file not found").await;
        return Err(JobError::NotFound(format!(
            "database file {}",
            source.display()
        )));
    }

    checkpoint(pool).await?;
    tokio::fs::create_dir_all(backup_dir).await?;

    let target = backup_dir.join(backup_file_name(Utc::now()));
    tokio::fs::copy(&source, &target).await?;
    tracing::info!(path = %target.display(), "Database backup written");

    let removed = select_for_rotation(list_backups(backup_dir).await?, retention);
    for name in &removed {
        if let Err(e) = tokio::fs::remove_file(backup_dir.join(name)).await {
            tracing::warn!(file = %name, error = %e, "Could not delete old backup");
        }
    }

    record_event(
        pool,
        LogLevel::Info,
        &format!("Backup created: {} ({} old removed)", target.display(), removed.len()),
    )
    .await;

    Ok(BackupSummary {
        path: target,
        removed,
    })
}
