//! Advisory locks stored in the `locks` table

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use crate::error::VodumResult;

/// Try to take the named lock. A lock older than `stale_after` is taken over.
/// Returns false when another holder owns a fresh lock.
pub async fn try_acquire(pool: &SqlitePool, name: &str, stale_after: Duration) -> VodumResult<bool> {
    let now = Utc::now();

    let inserted = sqlx::query("INSERT OR IGNORE INTO locks (name, acquired_at) VALUES (?1, ?2)")
        .bind(name)
        .bind(now.to_rfc3339())
        .execute(pool)
        .await?
        .rows_affected();

    if inserted == 1 {
        return Ok(true);
    }

    let acquired_at: Option<(String,)> =
        sqlx::query_as("SELECT acquired_at FROM locks WHERE name = ?1")
            .bind(name)
            .fetch_optional(pool)
            .await?;

    let stale = match acquired_at {
        // Released between the two statements
        None => true,
        Some((at,)) => DateTime::parse_from_rfc3339(&at)
            .map(|at| now - at.with_timezone(&Utc) > stale_after)
            .unwrap_or(true),
    };

    if !stale {
        return Ok(false);
    }

    tracing::warn!(lock = name, "Taking over stale lock");
    sqlx::query(
        r#"
        INSERT INTO locks (name, acquired_at) VALUES (?1, ?2)
        ON CONFLICT(name) DO UPDATE SET acquired_at = excluded.acquired_at
        "#,
    )
    .bind(name)
    .bind(now.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(true)
}

pub async fn release(pool: &SqlitePool, name: &str) -> VodumResult<()> {
    sqlx::query("DELETE FROM locks WHERE name = ?1")
        .bind(name)
        .execute(pool)
        .await?;
    Ok(())
}
