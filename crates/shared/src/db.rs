//! Database utilities and connection management

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Row;
use std::{str::FromStr, time::Duration};

use crate::error::{VodumError, VodumResult};

/// Columns that older panel databases may lack.
/// Applied after migrations as "add column if missing" patches.
const LEGACY_COLUMNS: &[(&str, &str, &str)] = &[
    ("users", "status", "TEXT"),
    ("users", "last_status", "TEXT"),
    ("users", "status_changed_at", "TEXT"),
    ("users", "library_access", "TEXT"),
    ("users", "second_email", "TEXT"),
    ("users", "discord_user_id", "TEXT"),
    ("servers", "tautulli_status", "TEXT"),
    ("servers", "last_checked", "TEXT"),
    ("settings", "send_reminders", "INTEGER NOT NULL DEFAULT 0"),
    ("settings", "disable_on_expiry", "INTEGER NOT NULL DEFAULT 0"),
    ("settings", "delete_after_expiry_days", "INTEGER"),
    ("settings", "plex_auth_token", "TEXT"),
];

/// Create a database connection pool
/// WAL mode and a busy timeout keep independently scheduled jobs from
/// tripping over each other's write locks.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(4)
        .min_connections(0)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(60))
        .connect_with(options)
        .await
}

/// Create a single-connection in-memory pool.
/// The connection is never recycled, otherwise the database would vanish with it.
pub async fn create_memory_pool() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
}

/// Run database migrations, then patch columns missing from older databases
pub async fn run_migrations(pool: &SqlitePool) -> VodumResult<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    upgrade_legacy_schema(pool).await?;
    Ok(())
}

/// Add every known column that is missing. Returns how many were added.
pub async fn upgrade_legacy_schema(pool: &SqlitePool) -> VodumResult<usize> {
    let mut added = 0;
    for (table, column, decl) in LEGACY_COLUMNS {
        if ensure_column(pool, table, column, decl).await? {
            added += 1;
        }
    }
    Ok(added)
}

/// Add `column` to `table` if it does not exist yet. Returns true when added.
pub async fn ensure_column(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    decl: &str,
) -> VodumResult<bool> {
    if !is_identifier(table) || !is_identifier(column) {
        return Err(VodumError::Validation(format!(
            "invalid identifier: {}.{}",
            table, column
        )));
    }

    let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
        .fetch_all(pool)
        .await?;

    let exists = rows
        .iter()
        .any(|row| row.try_get::<String, _>("name").map(|n| n == column).unwrap_or(false));

    if exists {
        tracing::debug!(table, column, "Column already present");
        return Ok(false);
    }

    sqlx::query(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl))
        .execute(pool)
        .await?;
    tracing::info!(table, column, "Added missing column");
    Ok(true)
}

/// Flush the WAL into the main database file so a plain file copy is complete
pub async fn checkpoint(pool: &SqlitePool) -> VodumResult<()> {
    sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
        .execute(pool)
        .await?;
    Ok(())
}

/// Extract the filesystem path from a `sqlite:` URL.
/// Returns None for in-memory databases.
pub fn sqlite_path_from_url(database_url: &str) -> Option<std::path::PathBuf> {
    let rest = database_url.trim().strip_prefix("sqlite:")?;
    let rest = rest.split('?').next().unwrap_or(rest);
    let path = if let Some(abs) = rest.strip_prefix("///") {
        format!("/{}", abs)
    } else if let Some(rel) = rest.strip_prefix("//") {
        rel.to_string()
    } else {
        rest.to_string()
    };

    if path.is_empty() || path == ":memory:" {
        None
    } else {
        Some(std::path::PathBuf::from(path))
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
