//! Plex and Tautulli health checks

use std::collections::HashMap;

use serde::Serialize;
use sqlx::SqlitePool;
use vodum_shared::dates::now_rfc3339;
use vodum_shared::event_log::{record_event, LogLevel};
use vodum_shared::ServerRecord;

use crate::error::JobResult;
use crate::plex::{PlexClient, PlexError};
use crate::tautulli::TautulliClient;

pub const STATUS_OK: &str = "ok";
pub const STATUS_UNREACHABLE: &str = "unreachable";
pub const STATUS_NOT_CONFIGURED: &str = "not_configured";
pub const STATUS_ERROR: &str = "error";

#[derive(Debug, Clone, Serialize)]
pub struct ServerHealth {
    pub server_id: i64,
    pub name: String,
    pub plex_status: String,
    pub tautulli_status: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerCheckSummary {
    pub servers: Vec<ServerHealth>,
}

/// Map a probe error onto the stored status vocabulary
pub fn status_from_error(err: &PlexError) -> String {
    match err {
        PlexError::Status { status, .. } => format!("http_{}", status),
        PlexError::Http(_) => STATUS_UNREACHABLE.to_string(),
        _ => STATUS_ERROR.to_string(),
    }
}

/// Device names by machine identifier, across every known token
async fn resource_names(plex: &PlexClient, servers: &[ServerRecord]) -> HashMap<String, String> {
    let mut names = HashMap::new();
    let mut tried: Vec<&str> = Vec::new();

    for token in servers.iter().filter_map(|s| s.plex_token.as_deref()) {
        let token = token.trim();
        if token.is_empty() || tried.contains(&token) {
            continue;
        }
        tried.push(token);

        match plex.resources(token).await {
            Ok(resources) => {
                for resource in resources.into_iter().filter(|r| r.is_server()) {
                    if !resource.name.is_empty() {
                        names.insert(resource.client_identifier, resource.name);
                    }
                }
            }
            Err(e) => tracing::debug!(error = %e, "Could not refresh server names"),
        }
    }

    names
}

pub async fn check_servers(
    pool: &SqlitePool,
    plex: &PlexClient,
    tautulli: &TautulliClient,
) -> JobResult<ServerCheckSummary> {
    let servers = sqlx::query_as::<_, ServerRecord>(&format!(
        "SELECT {} FROM servers ORDER BY id",
        ServerRecord::COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    let names = resource_names(plex, &servers).await;
    let mut summary = ServerCheckSummary::default();

    for server in &servers {
        let mut identifier = server.server_identifier.clone();

        let plex_status = match server.plex_endpoint() {
            None => STATUS_NOT_CONFIGURED.to_string(),
            Some((url, token)) => match plex.server_identity(url, token).await {
                Ok(machine_id) => {
                    if identifier.as_deref() != Some(machine_id.as_str()) {
                        let (taken,): (i64,) = sqlx::query_as(
                            "SELECT COUNT(*) FROM servers WHERE server_identifier = ?1 AND id != ?2",
                        )
                        .bind(&machine_id)
                        .bind(server.id)
                        .fetch_one(pool)
                        .await?;

                        if taken == 0 {
                            identifier = Some(machine_id);
                        } else {
                            tracing::warn!(
                                server = %server.name,
                                machine_id = %machine_id,
                                "Machine identifier already used by another server"
                            );
                        }
                    }
                    STATUS_OK.to_string()
                }
                Err(e) => {
                    tracing::warn!(server = %server.name, error = %e, "Plex server check failed");
                    status_from_error(&e)
                }
            },
        };

        let tautulli_status = match server.tautulli_endpoint() {
            None => STATUS_NOT_CONFIGURED.to_string(),
            Some((url, api_key)) => match tautulli.status(url, api_key).await {
                Ok(()) => STATUS_OK.to_string(),
                Err(e) => {
                    tracing::warn!(server = %server.name, error = %e, "Tautulli check failed");
                    status_from_error(&e)
                }
            },
        };

        let name = identifier
            .as_deref()
            .and_then(|id| names.get(id))
            .cloned()
            .unwrap_or_else(|| server.name.clone());

        sqlx::query(
            r#"
            UPDATE servers
            SET plex_status = ?1, tautulli_status = ?2, last_checked = ?3,
                server_identifier = ?4, name = ?5
            WHERE id = ?6
            "#,
        )
        .bind(&plex_status)
        .bind(&tautulli_status)
        .bind(now_rfc3339())
        .bind(&identifier)
        .bind(&name)
        .bind(server.id)
        .execute(pool)
        .await?;

        tracing::info!(
            server = %name,
            plex = %plex_status,
            tautulli = %tautulli_status,
            "Server checked"
        );
        summary.servers.push(ServerHealth {
            server_id: server.id,
            name,
            plex_status,
            tautulli_status,
        });
    }

    let down = summary
        .servers
        .iter()
        .filter(|s| s.plex_status != STATUS_OK && s.plex_status != STATUS_NOT_CONFIGURED)
        .count();
    record_event(
        pool,
        if down > 0 { LogLevel::Warn } else { LogLevel::Info },
        &format!("Server check: {} servers, {} unreachable", summary.servers.len(), down),
    )
    .await;

    Ok(summary)
}
