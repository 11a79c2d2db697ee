//! Task registry and `task_status` bookkeeping

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::VodumResult;

/// Every job the worker and the admin API can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    DisableExpiredUsers,
    SyncUsers,
    CheckServers,
    SendReminders,
    Backup,
    DeleteExpiredUsers,
    CheckLibraries,
    UpdateUserStatus,
    SendMailQueue,
    CleanTemp,
    SyncUserLibraries,
}

impl TaskKind {
    pub const ALL: [TaskKind; 11] = [
        Self::DisableExpiredUsers,
        Self::SyncUsers,
        Self::CheckServers,
        Self::SendReminders,
        Self::Backup,
        Self::DeleteExpiredUsers,
        Self::CheckLibraries,
        Self::UpdateUserStatus,
        Self::SendMailQueue,
        Self::CleanTemp,
        Self::SyncUserLibraries,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::DisableExpiredUsers => "disable_expired_users",
            Self::SyncUsers => "sync_users",
            Self::CheckServers => "check_servers",
            Self::SendReminders => "send_reminders",
            Self::Backup => "backup",
            Self::DeleteExpiredUsers => "delete_expired_users",
            Self::CheckLibraries => "check_libraries",
            Self::UpdateUserStatus => "update_user_status",
            Self::SendMailQueue => "send_mail_queue",
            Self::CleanTemp => "clean_temp",
            Self::SyncUserLibraries => "sync_user_libraries",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::DisableExpiredUsers => "Disable expired users",
            Self::SyncUsers => "Synchronize Plex users",
            Self::CheckServers => "Check servers",
            Self::SendReminders => "Send reminder emails",
            Self::Backup => "Database backup",
            Self::DeleteExpiredUsers => "Unfriend expired users",
            Self::CheckLibraries => "Check libraries",
            Self::UpdateUserStatus => "Update user status",
            Self::SendMailQueue => "Send mail campaigns",
            Self::CleanTemp => "Clean temporary files",
            Self::SyncUserLibraries => "Synchronize user libraries",
        }
    }

    /// Interval in minutes; 0 means the task only runs on demand
    pub fn interval_minutes(&self) -> u32 {
        match self {
            Self::SyncUsers | Self::CheckServers | Self::SendMailQueue => 60,
            Self::CheckLibraries => 720,
            Self::SyncUserLibraries => 0,
            Self::DisableExpiredUsers
            | Self::SendReminders
            | Self::Backup
            | Self::DeleteExpiredUsers
            | Self::UpdateUserStatus
            | Self::CleanTemp => 1440,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.interval_minutes() > 0
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|task| task.name() == wanted)
            .ok_or_else(|| format!("Unknown task: {}", s))
    }
}

/// A task as shown in listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusView {
    pub name: String,
    pub label: String,
    pub interval_minutes: u32,
    pub last_run: Option<String>,
    pub next_run: Option<String>,
}

/// Upsert the run timestamp of a task
pub async fn record_task_run(
    pool: &SqlitePool,
    task: TaskKind,
    next_run: Option<DateTime<Utc>>,
) -> VodumResult<()> {
    sqlx::query(
        r#"
        INSERT INTO task_status (name, last_run, next_run)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(name) DO UPDATE SET last_run = excluded.last_run, next_run = excluded.next_run
        "#,
    )
    .bind(task.name())
    .bind(Utc::now().to_rfc3339())
    .bind(next_run.map(|t| t.to_rfc3339()))
    .execute(pool)
    .await?;

    tracing::debug!(task = task.name(), "Recorded task run");
    Ok(())
}

/// Registry merged with stored runs. Tasks never run appear with empty timestamps.
pub async fn list_task_statuses(pool: &SqlitePool) -> VodumResult<Vec<TaskStatusView>> {
    let rows: Vec<(String, Option<String>, Option<String>)> =
        sqlx::query_as("SELECT name, last_run, next_run FROM task_status")
            .fetch_all(pool)
            .await?;

    let views = TaskKind::ALL
        .iter()
        .map(|task| {
            let stored = rows.iter().find(|(name, _, _)| name == task.name());
            let last_run = stored.and_then(|(_, last, _)| last.clone());
            let next_run = stored
                .and_then(|(_, _, next)| next.clone())
                .filter(|n| !n.trim().is_empty())
                .or_else(|| derive_next_run(*task, last_run.as_deref()));

            TaskStatusView {
                name: task.name().to_string(),
                label: task.label().to_string(),
                interval_minutes: task.interval_minutes(),
                last_run,
                next_run,
            }
        })
        .collect();

    Ok(views)
}

fn derive_next_run(task: TaskKind, last_run: Option<&str>) -> Option<String> {
    if !task.is_scheduled() {
        return None;
    }
    let last = DateTime::parse_from_rfc3339(last_run?).ok()?;
    let next = last.with_timezone(&Utc) + Duration::minutes(i64::from(task.interval_minutes()));
    Some(next.to_rfc3339())
}
