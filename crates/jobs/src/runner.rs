//! Single entry point used by the worker and the admin API to run a task

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use vodum_shared::event_log::{record_event, LogLevel};
use vodum_shared::settings::load_settings;
use vodum_shared::tasks::record_task_run;
use vodum_shared::TaskKind;

use crate::config::JobsConfig;
use crate::error::{JobError, JobResult};
use crate::mailer::SmtpMailer;
use crate::plex::PlexClient;
use crate::tautulli::TautulliClient;
use crate::{
    backup, libraries, mail_queue, reminders, revocation, servers, status, sync, temp_cleanup,
    unfriend,
};

/// Shared handles every job needs
#[derive(Debug, Clone)]
pub struct JobContext {
    pub pool: SqlitePool,
    pub plex: PlexClient,
    pub tautulli: TautulliClient,
    pub config: JobsConfig,
}

impl JobContext {
    pub fn new(pool: SqlitePool, config: JobsConfig) -> JobResult<Self> {
        Ok(Self {
            plex: PlexClient::new(&config.plex_tv_url)?,
            tautulli: TautulliClient::new()?,
            pool,
            config,
        })
    }
}

fn to_json<T: serde::Serialize>(summary: T) -> JobResult<serde_json::Value> {
    serde_json::to_value(summary).map_err(|e| JobError::Internal(e.to_string()))
}

async fn dispatch(ctx: &JobContext, task: TaskKind) -> JobResult<serde_json::Value> {
    let pool = &ctx.pool;
    match task {
        TaskKind::SyncUsers => to_json(sync::sync_users(pool, &ctx.plex).await?),
        TaskKind::SyncUserLibraries => to_json(sync::sync_user_libraries(pool, &ctx.plex).await?),
        TaskKind::UpdateUserStatus => to_json(status::update_user_status(pool, &ctx.plex).await?),
        TaskKind::DisableExpiredUsers => {
            to_json(revocation::disable_expired_users(pool, &ctx.plex).await?)
        }
        TaskKind::DeleteExpiredUsers => {
            to_json(unfriend::delete_expired_users(pool, &ctx.plex).await?)
        }
        TaskKind::CheckServers => {
            to_json(servers::check_servers(pool, &ctx.plex, &ctx.tautulli).await?)
        }
        TaskKind::CheckLibraries => to_json(libraries::check_libraries(pool, &ctx.plex).await?),
        TaskKind::Backup => to_json(
            backup::backup_database(
                pool,
                &ctx.config.database_url,
                &ctx.config.backup_dir,
                ctx.config.backup_retention,
            )
            .await?,
        ),
        TaskKind::CleanTemp => to_json(
            temp_cleanup::clean_temp(&ctx.config.temp_dir, ctx.config.temp_max_age).await?,
        ),
        TaskKind::SendReminders => {
            let settings = load_settings(pool).await?;
            if !settings.send_reminders {
                tracing::debug!("Reminder emails disabled in settings");
                return to_json(reminders::ReminderSummary::default());
            }
            let mailer = SmtpMailer::from_settings(&settings)?;
            to_json(
                reminders::send_reminders(pool, &mailer, ctx.config.reminder_send_delay).await?,
            )
        }
        TaskKind::SendMailQueue => {
            let settings = load_settings(pool).await?;
            let mailer = match SmtpMailer::from_settings(&settings) {
                Ok(mailer) => Some(mailer),
                Err(e) => {
                    tracing::debug!(error = %e, "SMTP unavailable for campaigns");
                    None
                }
            };
            to_json(
                mail_queue::send_mail_queue(pool, mailer.as_ref(), ctx.config.mail_queue_delay)
                    .await?,
            )
        }
    }
}

/// Run one task, record its run in `task_status` and return its summary
pub async fn run_task(ctx: &JobContext, task: TaskKind) -> JobResult<serde_json::Value> {
    tracing::info!(task = task.name(), "Task started");
    let started = std::time::Instant::now();

    match dispatch(ctx, task).await {
        Ok(summary) => {
            let next_run = task
                .is_scheduled()
                .then(|| Utc::now() + Duration::minutes(i64::from(task.interval_minutes())));
            record_task_run(&ctx.pool, task, next_run).await?;

            tracing::info!(
                task = task.name(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Task completed"
            );
            Ok(summary)
        }
        Err(e) => {
            tracing::error!(task = task.name(), error = %e, "Task failed");
            record_event(
                &ctx.pool,
                LogLevel::Error,
                &format!("Task {} failed: {}", task.name(), e),
            )
            .await;
            Err(e)
        }
    }
}
