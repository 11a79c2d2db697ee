//! Periodic task scheduling

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use vodum_jobs::{run_task, JobContext};
use vodum_shared::TaskKind;

/// Tasks with a non-zero interval and their period
pub fn scheduled_tasks() -> Vec<(TaskKind, Duration)> {
    TaskKind::ALL
        .iter()
        .copied()
        .filter(|task| task.is_scheduled())
        .map(|task| (task, Duration::from_secs(u64::from(task.interval_minutes()) * 60)))
        .collect()
}

/// Register every scheduled task and start the scheduler.
/// Runs are serialized so two jobs never write at the same time.
pub async fn start(ctx: JobContext) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;
    let running = Arc::new(Mutex::new(()));

    for (task, period) in scheduled_tasks() {
        let ctx = ctx.clone();
        let running = running.clone();

        let job = Job::new_repeated_async(period, move |_uuid, _scheduler| {
            let ctx = ctx.clone();
            let running = running.clone();
            Box::pin(async move {
                let _guard = running.lock().await;
                // Failures are already logged and recorded by run_task
                let _ = run_task(&ctx, task).await;
            })
        })?;

        scheduler.add(job).await?;
        tracing::info!(task = task.name(), every_minutes = task.interval_minutes(), "Task scheduled");
    }

    scheduler.start().await?;
    Ok(scheduler)
}
