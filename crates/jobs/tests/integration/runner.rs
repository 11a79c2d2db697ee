//! Task runner bookkeeping

use sqlx::SqlitePool;
use vodum_jobs::{run_task, JobContext, JobError, JobsConfig};
use vodum_shared::TaskKind;

use crate::common::*;

fn context(pool: &SqlitePool, dir: &std::path::Path) -> JobContext {
    let config = JobsConfig {
        database_url: format!("sqlite://{}", dir.join("missing.db").display()),
        backup_dir: dir.join("backup"),
        temp_dir: dir.join("temp"),
        ..JobsConfig::default()
    };
    JobContext::new(pool.clone(), config).unwrap()
}

async fn last_run(pool: &SqlitePool, task: &str) -> Option<(Option<String>, Option<String>)> {
    sqlx::query_as("SELECT last_run, next_run FROM task_status WHERE name = ?1")
        .bind(task)
        .fetch_optional(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_failed_task_is_logged_and_not_recorded_as_run() {
    let pool = pool().await;
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&pool, dir.path());

    let err = run_task(&ctx, TaskKind::Backup).await.unwrap_err();
    assert!(matches!(err, JobError::NotFound(_)));

    if let Some((last, _)) = last_run(&pool, "backup").await {
        assert_eq!(last, None);
    }

    let (failures,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM logs WHERE event LIKE '[ERROR] Task backup failed:%'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(failures, 1);
}

#[tokio::test]
async fn test_successful_task_records_last_and_next_run() {
    let pool = pool().await;
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&pool, dir.path());

    let summary = run_task(&ctx, TaskKind::CleanTemp).await.unwrap();
    assert_eq!(summary["removed"], 0);

    let (last, next) = last_run(&pool, "clean_temp").await.unwrap();
    assert!(last.is_some());
    assert!(next.is_some());
}
