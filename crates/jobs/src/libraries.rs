//! Library pruning

use serde::Serialize;
use sqlx::SqlitePool;
use vodum_shared::event_log::{record_event, LogLevel};
use vodum_shared::ServerRecord;

use crate::error::JobResult;
use crate::plex::PlexClient;
use crate::sync::{sync_users, SyncSummary};

#[derive(Debug, Clone, Default, Serialize)]
pub struct LibraryCheckSummary {
    pub removed_missing: u64,
    pub removed_orphans: u64,
    pub sync: SyncSummary,
}

/// Drop libraries gone from their server and libraries with no server,
/// then resync so grants are rebuilt
pub async fn check_libraries(pool: &SqlitePool, plex: &PlexClient) -> JobResult<LibraryCheckSummary> {
    let mut summary = LibraryCheckSummary::default();

    let servers = sqlx::query_as::<_, ServerRecord>(&format!(
        "SELECT {} FROM servers WHERE type = 'plex' ORDER BY id",
        ServerRecord::COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    for server in &servers {
        let (Some(identifier), Some((url, token))) =
            (server.server_identifier.as_deref(), server.plex_endpoint())
        else {
            continue;
        };

        let sections = match plex.library_sections(url, token).await {
            Ok(sections) => sections,
            Err(e) => {
                tracing::warn!(server = %server.name, error = %e, "Could not list libraries, skipping");
                continue;
            }
        };

        let local: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM libraries WHERE server_identifier = ?1")
                .bind(identifier)
                .fetch_all(pool)
                .await?;

        for (id, name) in local {
            if sections.iter().any(|s| s.title == name) {
                continue;
            }
            sqlx::query("DELETE FROM libraries WHERE id = ?1")
                .bind(id)
                .execute(pool)
                .await?;
            summary.removed_missing += 1;
            tracing::info!(server = %server.name, library = %name, "Removed library missing from server");
        }
    }

    summary.removed_orphans = sqlx::query(
        r#"
        DELETE FROM libraries
        WHERE server_identifier IS NULL OR TRIM(server_identifier) = ''
           OR server_identifier NOT IN (
               SELECT server_identifier FROM servers WHERE server_identifier IS NOT NULL
           )
        "#,
    )
    .execute(pool)
    .await?
    .rows_affected();

    if summary.removed_orphans > 0 {
        tracing::info!(removed = summary.removed_orphans, "Removed orphan libraries");
    }

    record_event(
        pool,
        LogLevel::Info,
        &format!(
            "Library check: {} missing and {} orphan libraries removed",
            summary.removed_missing, summary.removed_orphans
        ),
    )
    .await;

    summary.sync = sync_users(pool, plex).await?;
    Ok(summary)
}
