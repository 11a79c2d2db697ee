//! Plex to database reconciliation
//!
//! A sync pass discovers servers from Plex.tv resources, upserts users and
//! libraries, then reconciles each user's library grants by set difference.
//! Re-running it against unchanged remote state writes nothing.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use vodum_shared::event_log::{record_event, LogLevel};
use vodum_shared::settings::load_settings;
use vodum_shared::ServerRecord;

use crate::error::JobResult;
use crate::plex::{LibrarySection, PlexClient, PlexResource, PlexUser};

/// Days of access granted to users seen for the first time
pub const NEW_USER_TRIAL_DAYS: i64 = 30;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSummary {
    pub servers_discovered: usize,
    pub users_created: usize,
    pub users_updated: usize,
    pub users_skipped: usize,
    pub libraries_upserted: usize,
    pub grants_added: usize,
    pub grants_removed: usize,
    pub user_servers_rebuilt: u64,
}

/// A Plex account merged across every server token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUser {
    pub plex_id: String,
    pub username: String,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub is_admin: bool,
}

impl RemoteUser {
    /// None when the entry has neither a name nor an email
    pub fn from_plex(user: &PlexUser, is_admin: bool) -> Option<Self> {
        let email = user.email.as_deref().map(str::trim).filter(|e| !e.is_empty());
        let username = user.display_name().or(email)?;

        Some(Self {
            plex_id: user.id.clone(),
            username: username.to_string(),
            email: email.map(str::to_string),
            avatar: user.thumb.clone(),
            is_admin,
        })
    }

    fn merge_key(&self) -> String {
        match &self.email {
            Some(email) => email.to_lowercase(),
            None => format!("id_{}", self.plex_id),
        }
    }
}

/// Merge a user into the map keyed by lower-cased email (or plex id).
/// Admin rights are OR-ed; missing fields are filled from later sightings.
pub fn merge_remote_user(users: &mut BTreeMap<String, RemoteUser>, candidate: RemoteUser) {
    match users.get_mut(&candidate.merge_key()) {
        Some(existing) => {
            existing.is_admin |= candidate.is_admin;
            if existing.avatar.is_none() {
                existing.avatar = candidate.avatar;
            }
        }
        None => {
            users.insert(candidate.merge_key(), candidate);
        }
    }
}

/// Full synchronization pass
pub async fn sync_users(pool: &SqlitePool, plex: &PlexClient) -> JobResult<SyncSummary> {
    let mut summary = SyncSummary {
        servers_discovered: discover_servers(pool, plex).await?,
        ..Default::default()
    };

    let remote_users = collect_remote_users(pool, plex, &mut summary).await?;
    upsert_users(pool, &remote_users, &mut summary).await?;
    reconcile_libraries(pool, plex, &mut summary).await?;
    summary.user_servers_rebuilt = rebuild_user_servers(pool).await?;

    tracing::info!(
        servers = summary.servers_discovered,
        created = summary.users_created,
        updated = summary.users_updated,
        grants_added = summary.grants_added,
        grants_removed = summary.grants_removed,
        "Plex sync complete"
    );
    record_event(
        pool,
        LogLevel::Info,
        &format!(
            "Plex sync: {} users created, {} updated, {} grants added, {} removed",
            summary.users_created,
            summary.users_updated,
            summary.grants_added,
            summary.grants_removed
        ),
    )
    .await;

    Ok(summary)
}

/// Grant reconciliation only, without touching servers or user identities
pub async fn sync_user_libraries(pool: &SqlitePool, plex: &PlexClient) -> JobResult<SyncSummary> {
    let mut summary = SyncSummary::default();
    reconcile_libraries(pool, plex, &mut summary).await?;
    summary.user_servers_rebuilt = rebuild_user_servers(pool).await?;

    tracing::info!(
        grants_added = summary.grants_added,
        grants_removed = summary.grants_removed,
        "User library sync complete"
    );
    Ok(summary)
}

async fn load_servers(pool: &SqlitePool) -> JobResult<Vec<ServerRecord>> {
    let servers = sqlx::query_as::<_, ServerRecord>(&format!(
        "SELECT {} FROM servers ORDER BY id",
        ServerRecord::COLUMNS
    ))
    .fetch_all(pool)
    .await?;
    Ok(servers)
}

fn distinct_tokens<'a>(tokens: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = Vec::new();
    for token in tokens.map(str::trim).filter(|t| !t.is_empty()) {
        if !seen.iter().any(|t: &String| t == token) {
            seen.push(token.to_string());
        }
    }
    seen
}

/// Upsert every server device visible to a known token. Returns devices seen.
async fn discover_servers(pool: &SqlitePool, plex: &PlexClient) -> JobResult<usize> {
    let servers = load_servers(pool).await?;
    let settings = load_settings(pool).await?;
    let tokens = distinct_tokens(
        servers
            .iter()
            .filter_map(|s| s.plex_token.as_deref())
            .chain(settings.plex_auth_token.as_deref()),
    );

    let mut discovered = 0;
    for token in tokens {
        let resources = match plex.resources(&token).await {
            Ok(resources) => resources,
            Err(e) => {
                tracing::warn!(error = %e, "Could not list Plex resources for a token");
                continue;
            }
        };

        for resource in resources.iter().filter(|r| r.is_server()) {
            upsert_server(pool, resource, &token).await?;
            discovered += 1;
        }
    }

    Ok(discovered)
}

async fn upsert_server(pool: &SqlitePool, resource: &PlexResource, fallback_token: &str) -> JobResult<()> {
    let token = resource.access_token.as_deref().unwrap_or(fallback_token);
    let local = resource.local_uri();
    let public = resource.public_uri();
    let url = local.or(public);

    // Adopt a manually added row that matches by url and has no identifier yet
    if let Some(url) = url {
        sqlx::query(
            r#"
            UPDATE servers SET server_identifier = ?1
            WHERE server_identifier IS NULL AND plex_url IN (?2, ?3)
              AND NOT EXISTS (SELECT 1 FROM servers WHERE server_identifier = ?1)
            "#,
        )
        .bind(&resource.client_identifier)
        .bind(url)
        .bind(public.unwrap_or(url))
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO servers (server_identifier, name, type, plex_url, plex_token, local_url, public_url)
        VALUES (?1, ?2, 'plex', ?3, ?4, ?5, ?6)
        ON CONFLICT(server_identifier) DO UPDATE SET
            name = excluded.name,
            plex_url = COALESCE(servers.plex_url, excluded.plex_url),
            plex_token = excluded.plex_token,
            local_url = excluded.local_url,
            public_url = excluded.public_url
        WHERE servers.name IS NOT excluded.name
           OR servers.plex_url IS NULL
           OR servers.plex_token IS NOT excluded.plex_token
           OR servers.local_url IS NOT excluded.local_url
           OR servers.public_url IS NOT excluded.public_url
        "#,
    )
    .bind(&resource.client_identifier)
    .bind(&resource.name)
    .bind(url)
    .bind(token)
    .bind(local)
    .bind(public)
    .execute(pool)
    .await?;

    tracing::debug!(server = %resource.name, identifier = %resource.client_identifier, "Server upserted");
    Ok(())
}

/// Servers considered reachable: checked OK, or never checked yet
fn is_reachable(server: &ServerRecord) -> bool {
    match server.plex_status.as_deref() {
        None => true,
        Some(status) => status == "ok",
    }
}

async fn collect_remote_users(
    pool: &SqlitePool,
    plex: &PlexClient,
    summary: &mut SyncSummary,
) -> JobResult<BTreeMap<String, RemoteUser>> {
    let servers = load_servers(pool).await?;
    let tokens = distinct_tokens(
        servers
            .iter()
            .filter(|s| is_reachable(s))
            .filter_map(|s| s.plex_token.as_deref()),
    );

    let mut users = BTreeMap::new();
    for token in tokens {
        match plex.account(&token).await {
            Ok(account) => {
                let owner = PlexUser {
                    id: account.id,
                    username: account.username,
                    title: None,
                    email: account.email,
                    thumb: None,
                };
                if let Some(user) = RemoteUser::from_plex(&owner, true) {
                    merge_remote_user(&mut users, user);
                }
            }
            Err(e) => tracing::warn!(error = %e, "Could not load Plex owner account"),
        }

        match plex.users(&token).await {
            Ok(plex_users) => {
                for plex_user in &plex_users {
                    match RemoteUser::from_plex(plex_user, false) {
                        Some(user) => merge_remote_user(&mut users, user),
                        None => {
                            summary.users_skipped += 1;
                            tracing::warn!(plex_id = %plex_user.id, "Skipping Plex user without name or email");
                        }
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "Could not load Plex users"),
        }
    }

    Ok(users)
}

async fn upsert_users(
    pool: &SqlitePool,
    remote_users: &BTreeMap<String, RemoteUser>,
    summary: &mut SyncSummary,
) -> JobResult<()> {
    let trial_end = (Utc::now() + Duration::days(NEW_USER_TRIAL_DAYS))
        .format("%Y-%m-%d")
        .to_string();

    for user in remote_users.values() {
        let existing: Option<(i64, String, Option<String>, Option<String>, bool)> = sqlx::query_as(
            "SELECT id, username, email, avatar, is_admin FROM users WHERE plex_id = ?1",
        )
        .bind(&user.plex_id)
        .fetch_optional(pool)
        .await?;

        match existing {
            Some((id, username, email, avatar, is_admin)) => {
                let unchanged = username == user.username
                    && email == user.email
                    && (user.avatar.is_none() || avatar == user.avatar)
                    && is_admin == user.is_admin;
                if unchanged {
                    continue;
                }

                sqlx::query(
                    r#"
                    UPDATE users
                    SET username = ?1, email = ?2, avatar = COALESCE(?3, avatar), is_admin = ?4
                    WHERE id = ?5
                    "#,
                )
                .bind(&user.username)
                .bind(&user.email)
                .bind(&user.avatar)
                .bind(user.is_admin)
                .bind(id)
                .execute(pool)
                .await?;
                summary.users_updated += 1;
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO users (plex_id, username, email, avatar, is_admin, expiration_date)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                )
                .bind(&user.plex_id)
                .bind(&user.username)
                .bind(&user.email)
                .bind(&user.avatar)
                .bind(user.is_admin)
                .bind(&trial_end)
                .execute(pool)
                .await?;
                summary.users_created += 1;
                tracing::info!(plex_id = %user.plex_id, username = %user.username, "New Plex user");
            }
        }
    }

    Ok(())
}

/// Upsert a section by (name, server), then by (section_id, server). Returns the row id.
async fn upsert_library(
    pool: &SqlitePool,
    server_identifier: &str,
    section: &LibrarySection,
) -> JobResult<i64> {
    let by_name: Option<(i64, i64)> = sqlx::query_as(
        "SELECT id, section_id FROM libraries WHERE name = ?1 AND server_identifier = ?2",
    )
    .bind(&section.title)
    .bind(server_identifier)
    .fetch_optional(pool)
    .await?;

    if let Some((id, section_id)) = by_name {
        if section_id != section.key {
            // The key now belongs to this name; drop the row that held it
            sqlx::query(
                "DELETE FROM libraries WHERE section_id = ?1 AND server_identifier = ?2 AND id != ?3",
            )
            .bind(section.key)
            .bind(server_identifier)
            .bind(id)
            .execute(pool)
            .await?;
            sqlx::query("UPDATE libraries SET section_id = ?1 WHERE id = ?2")
                .bind(section.key)
                .bind(id)
                .execute(pool)
                .await?;
        }
        return Ok(id);
    }

    let by_key: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM libraries WHERE section_id = ?1 AND server_identifier = ?2")
            .bind(section.key)
            .bind(server_identifier)
            .fetch_optional(pool)
            .await?;

    if let Some((id,)) = by_key {
        sqlx::query("UPDATE libraries SET name = ?1 WHERE id = ?2")
            .bind(&section.title)
            .bind(id)
            .execute(pool)
            .await?;
        return Ok(id);
    }

    let result = sqlx::query(
        "INSERT INTO libraries (section_id, name, server_identifier) VALUES (?1, ?2, ?3)",
    )
    .bind(section.key)
    .bind(&section.title)
    .bind(server_identifier)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Upsert libraries of every reachable server and reconcile user grants
/// against Plex.tv shares. Only servers whose data loaded are reconciled.
async fn reconcile_libraries(
    pool: &SqlitePool,
    plex: &PlexClient,
    summary: &mut SyncSummary,
) -> JobResult<()> {
    let servers = load_servers(pool).await?;
    let mut remote_grants: HashMap<String, HashSet<i64>> = HashMap::new();
    let mut reconciled: HashSet<String> = HashSet::new();

    for server in &servers {
        let Some(identifier) = server.server_identifier.as_deref().filter(|i| !i.is_empty()) else {
            continue;
        };
        let Some((url, token)) = server.plex_endpoint() else {
            continue;
        };

        let sections = match plex.library_sections(url, token).await {
            Ok(sections) => sections,
            Err(e) => {
                tracing::warn!(server = %server.name, error = %e, "Could not list library sections");
                continue;
            }
        };
        let shares = match plex.shared_servers(token, identifier).await {
            Ok(shares) => shares,
            Err(e) => {
                tracing::warn!(server = %server.name, error = %e, "Could not list shared servers");
                continue;
            }
        };

        let mut by_title: HashMap<String, i64> = HashMap::new();
        let mut by_key: HashMap<i64, i64> = HashMap::new();
        for section in &sections {
            let id = upsert_library(pool, identifier, section).await?;
            by_title.insert(section.title.to_lowercase(), id);
            by_key.insert(section.key, id);
            summary.libraries_upserted += 1;
        }

        for share in &shares {
            let grants = remote_grants.entry(share.user_id.clone()).or_default();
            for section in share.shared_sections() {
                let library = by_title
                    .get(&section.title.to_lowercase())
                    .or_else(|| section.key.and_then(|k| by_key.get(&k)));
                match library {
                    Some(id) => {
                        grants.insert(*id);
                    }
                    None => tracing::debug!(
                        server = %server.name,
                        section = %section.title,
                        "Shared section not found on server"
                    ),
                }
            }
        }

        reconciled.insert(identifier.to_string());
    }

    if reconciled.is_empty() {
        return Ok(());
    }

    let libraries: Vec<(i64, Option<String>)> =
        sqlx::query_as("SELECT id, server_identifier FROM libraries")
            .fetch_all(pool)
            .await?;
    let reconciled_libraries: HashSet<i64> = libraries
        .into_iter()
        .filter(|(_, server)| server.as_ref().is_some_and(|s| reconciled.contains(s)))
        .map(|(id, _)| id)
        .collect();

    let users: Vec<(i64, String)> =
        sqlx::query_as("SELECT id, plex_id FROM users WHERE plex_id IS NOT NULL ORDER BY id")
            .fetch_all(pool)
            .await?;

    for (user_id, plex_id) in users {
        let remote = remote_grants.get(&plex_id).cloned().unwrap_or_default();
        let local_rows: Vec<(i64,)> =
            sqlx::query_as("SELECT library_id FROM user_libraries WHERE user_id = ?1")
                .bind(user_id)
                .fetch_all(pool)
                .await?;
        let local: HashSet<i64> = local_rows
            .into_iter()
            .map(|(id,)| id)
            .filter(|id| reconciled_libraries.contains(id))
            .collect();

        let missing: Vec<i64> = remote.difference(&local).copied().collect();
        let stale: Vec<i64> = local.difference(&remote).copied().collect();

        for library_id in &missing {
            sqlx::query("INSERT OR IGNORE INTO user_libraries (user_id, library_id) VALUES (?1, ?2)")
                .bind(user_id)
                .bind(library_id)
                .execute(pool)
                .await?;
        }
        for library_id in &stale {
            sqlx::query("DELETE FROM user_libraries WHERE user_id = ?1 AND library_id = ?2")
                .bind(user_id)
                .bind(library_id)
                .execute(pool)
                .await?;
        }

        summary.grants_added += missing.len();
        summary.grants_removed += stale.len();

        if !missing.is_empty() || !stale.is_empty() || !remote.is_empty() {
            refresh_user_grants(pool, user_id).await?;
        }
    }

    Ok(())
}

/// Recompute `library_access` from `user_libraries` and link the user to
/// every server they hold a grant on. `api` links without grants are dropped.
pub async fn refresh_user_grants(pool: &SqlitePool, user_id: i64) -> JobResult<()> {
    let sections: Vec<(i64,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT l.section_id
        FROM user_libraries ul
        JOIN libraries l ON l.id = ul.library_id
        WHERE ul.user_id = ?1
        ORDER BY l.section_id
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let csv = sections
        .iter()
        .map(|(id,)| id.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let library_access = if csv.is_empty() { None } else { Some(csv) };

    sqlx::query("UPDATE users SET library_access = ?1 WHERE id = ?2 AND library_access IS NOT ?1")
        .bind(&library_access)
        .bind(user_id)
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        INSERT OR IGNORE INTO user_servers (user_id, server_id, source)
        SELECT DISTINCT ul.user_id, s.id, 'api'
        FROM user_libraries ul
        JOIN libraries l ON l.id = ul.library_id
        JOIN servers s ON s.server_identifier = l.server_identifier
        WHERE ul.user_id = ?1
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        DELETE FROM user_servers
        WHERE user_id = ?1 AND source = 'api'
          AND server_id NOT IN (
              SELECT s.id
              FROM user_libraries ul
              JOIN libraries l ON l.id = ul.library_id
              JOIN servers s ON s.server_identifier = l.server_identifier
              WHERE ul.user_id = ?1
          )
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Link users to servers from their `library_access` section ids.
/// Existing links are kept. Returns the number of links created.
pub async fn rebuild_user_servers(pool: &SqlitePool) -> JobResult<u64> {
    let users: Vec<(i64, Option<String>)> = sqlx::query_as(
        "SELECT id, library_access FROM users WHERE library_access IS NOT NULL AND TRIM(library_access) != ''",
    )
    .fetch_all(pool)
    .await?;

    let mut created = 0;
    for (user_id, access) in users {
        for section_id in vodum_shared::parse_library_access(access.as_deref()) {
            created += sqlx::query(
                r#"
                INSERT OR IGNORE INTO user_servers (user_id, server_id, source)
                SELECT ?1, s.id, 'rebuild'
                FROM libraries l
                JOIN servers s ON s.server_identifier = l.server_identifier
                WHERE l.section_id = ?2
                "#,
            )
            .bind(user_id)
            .bind(section_id)
            .execute(pool)
            .await?
            .rows_affected();
        }
    }

    if created > 0 {
        tracing::info!(created, "Rebuilt user/server links");
    }
    Ok(created)
}
