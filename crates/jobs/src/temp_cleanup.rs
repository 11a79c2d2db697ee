//! Scratch directory cleanup

use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::Serialize;

use crate::error::JobResult;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupSummary {
    pub removed: usize,
    pub kept: usize,
}

/// Delete regular files in `dir` (not recursing) older than `max_age`.
/// A missing directory is only a warning.
pub async fn clean_temp(dir: &Path, max_age: Duration) -> JobResult<CleanupSummary> {
    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    clean_older_than(dir, cutoff).await
}

async fn clean_older_than(dir: &Path, cutoff: SystemTime) -> JobResult<CleanupSummary> {
    let mut summary = CleanupSummary::default();

    if !tokio::fs::try_exists(dir).await? {
        tracing::warn!(dir = %dir.display(), "Temp directory does not exist");
        return Ok(summary);
    }

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(file = %entry.path().display(), error = %e, "Cannot stat temp file");
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }

        let modified = metadata.modified().unwrap_or(SystemTime::now());
        if modified >= cutoff {
            summary.kept += 1;
            continue;
        }

        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => {
                summary.removed += 1;
                tracing::debug!(file = %entry.path().display(), "Removed temp file");
            }
            Err(e) => tracing::warn!(file = %entry.path().display(), error = %e, "Cannot remove temp file"),
        }
    }

    tracing::info!(removed = summary.removed, kept = summary.kept, "Temp cleanup complete");
    Ok(summary)
}
