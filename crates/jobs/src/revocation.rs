//! Strip library shares from expired and suspended users

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use vodum_shared::dates::parse_expiration_date;
use vodum_shared::event_log::{record_event, LogLevel};
use vodum_shared::settings::{find_admin_token, load_settings};
use vodum_shared::{ServerRecord, SubscriptionStatus, UserRecord};

use crate::error::JobResult;
use crate::plex::{PlexClient, SharedServer};
use crate::status::users_with_libraries;
use crate::sync::refresh_user_grants;

#[derive(Debug, Clone, Default, Serialize)]
pub struct RevocationSummary {
    pub enabled: bool,
    pub candidates: usize,
    pub servers_revoked: usize,
    pub failures: usize,
}

/// Users whose shares must go: non-admin, holding access, and either past
/// their expiration date or suspended.
async fn revocation_candidates(pool: &SqlitePool) -> JobResult<Vec<UserRecord>> {
    let with_libraries = users_with_libraries(pool).await?;
    let users = sqlx::query_as::<_, UserRecord>(&format!(
        "SELECT {} FROM users WHERE is_admin = 0 ORDER BY id",
        UserRecord::COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    let today = Utc::now().date_naive();
    Ok(users
        .into_iter()
        .filter(|u| with_libraries.contains(&u.id) || u.has_library_access_field())
        .filter(|u| {
            let expired = u
                .expiration_date
                .as_deref()
                .and_then(parse_expiration_date)
                .is_some_and(|date| date < today);
            expired || u.subscription_status() == Some(SubscriptionStatus::Suspended)
        })
        .collect())
}

/// Servers hosting any library the user holds, through grants or the legacy CSV
async fn servers_for_user(pool: &SqlitePool, user: &UserRecord) -> JobResult<Vec<ServerRecord>> {
    let mut servers = sqlx::query_as::<_, ServerRecord>(&format!(
        r#"
        SELECT {} FROM servers
        WHERE server_identifier IN (
            SELECT l.server_identifier FROM libraries l
            JOIN user_libraries ul ON ul.library_id = l.id WHERE ul.user_id = ?1
            UNION
            SELECT l.server_identifier FROM libraries l
            JOIN shared_libraries sl ON sl.library_id = l.id WHERE sl.user_id = ?1
        )
        ORDER BY id
        "#,
        ServerRecord::COLUMNS
    ))
    .bind(user.id)
    .fetch_all(pool)
    .await?;

    for section_id in user.library_access_ids() {
        let legacy = sqlx::query_as::<_, ServerRecord>(&format!(
            r#"
            SELECT {} FROM servers
            WHERE server_identifier IN (SELECT server_identifier FROM libraries WHERE section_id = ?1)
            "#,
            ServerRecord::COLUMNS
        ))
        .bind(section_id)
        .fetch_all(pool)
        .await?;

        for server in legacy {
            if !servers.iter().any(|s| s.id == server.id) {
                servers.push(server);
            }
        }
    }

    Ok(servers)
}

async fn remove_local_grants(pool: &SqlitePool, user_id: i64, server_identifier: &str) -> JobResult<()> {
    for table in ["user_libraries", "shared_libraries"] {
        sqlx::query(&format!(
            "DELETE FROM {} WHERE user_id = ?1 AND library_id IN \
             (SELECT id FROM libraries WHERE server_identifier = ?2)",
            table
        ))
        .bind(user_id)
        .bind(server_identifier)
        .execute(pool)
        .await?;
    }
    refresh_user_grants(pool, user_id).await
}

pub async fn disable_expired_users(
    pool: &SqlitePool,
    plex: &PlexClient,
) -> JobResult<RevocationSummary> {
    let settings = load_settings(pool).await?;
    if !settings.disable_on_expiry {
        tracing::debug!("Access revocation disabled in settings");
        return Ok(RevocationSummary::default());
    }

    let mut summary = RevocationSummary {
        enabled: true,
        ..Default::default()
    };
    let admin_token = find_admin_token(pool).await?;
    let candidates = revocation_candidates(pool).await?;
    summary.candidates = candidates.len();

    // Shared-server listings per machine identifier, fetched once per run
    let mut shares_cache: HashMap<String, Vec<SharedServer>> = HashMap::new();

    for user in &candidates {
        for server in servers_for_user(pool, user).await? {
            let Some(identifier) = server.server_identifier.as_deref() else {
                continue;
            };
            let token = server
                .plex_token
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .or(admin_token.as_deref());
            let Some(token) = token else {
                tracing::warn!(server = %server.name, "No Plex token to revoke access with");
                summary.failures += 1;
                continue;
            };

            if !shares_cache.contains_key(identifier) {
                match plex.shared_servers(token, identifier).await {
                    Ok(shares) => {
                        shares_cache.insert(identifier.to_string(), shares);
                    }
                    Err(e) => {
                        tracing::error!(server = %server.name, error = %e, "Could not list shared servers");
                        summary.failures += 1;
                        continue;
                    }
                }
            }

            let share = shares_cache.get(identifier).and_then(|shares| {
                shares
                    .iter()
                    .find(|s| user.plex_id.as_deref() == Some(s.user_id.as_str()))
            });

            if let Some(share) = share {
                if let Err(e) = plex
                    .update_shared_server_sections(token, &share.id, identifier, &[])
                    .await
                {
                    tracing::error!(
                        user_id = user.id,
                        server = %server.name,
                        error = %e,
                        "Failed to revoke library access"
                    );
                    summary.failures += 1;
                    continue;
                }
            } else {
                tracing::debug!(user_id = user.id, server = %server.name, "No share left on Plex");
            }

            remove_local_grants(pool, user.id, identifier).await?;
            summary.servers_revoked += 1;
            tracing::info!(
                user_id = user.id,
                username = %user.username,
                server = %server.name,
                "Library access revoked"
            );
        }
    }

    record_event(
        pool,
        if summary.failures > 0 { LogLevel::Warn } else { LogLevel::Info },
        &format!(
            "Access revocation: {} users, {} server shares removed, {} failures",
            summary.candidates, summary.servers_revoked, summary.failures
        ),
    )
    .await;

    Ok(summary)
}
