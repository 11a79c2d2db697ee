//! Server listing and live activity

use axum::{extract::State, Json};
use serde::Serialize;
use vodum_shared::ServerRecord;

use crate::{error::ApiResult, state::AppState};

#[derive(Debug, Serialize)]
pub struct ActivitySession {
    pub user: Option<String>,
    pub title: Option<String>,
    pub player: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ServerActivity {
    pub server_id: i64,
    pub server: String,
    /// `tautulli`, `plex`, or `none` when the server has no usable endpoint
    pub source: &'static str,
    pub sessions: Vec<ActivitySession>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn load_servers(state: &AppState) -> ApiResult<Vec<ServerRecord>> {
    let servers = sqlx::query_as::<_, ServerRecord>(&format!(
        "SELECT {} FROM servers ORDER BY name",
        ServerRecord::COLUMNS
    ))
    .fetch_all(&state.pool)
    .await?;
    Ok(servers)
}

pub async fn list_servers(State(state): State<AppState>) -> ApiResult<Json<Vec<ServerRecord>>> {
    Ok(Json(load_servers(&state).await?))
}

/// Current streams per server, from Tautulli when configured, else from Plex
pub async fn activity(State(state): State<AppState>) -> ApiResult<Json<Vec<ServerActivity>>> {
    let servers = load_servers(&state).await?;
    let mut activity = Vec::with_capacity(servers.len());

    for server in &servers {
        let mut entry = ServerActivity {
            server_id: server.id,
            server: server.name.clone(),
            source: "none",
            sessions: Vec::new(),
            error: None,
        };

        if let Some((url, api_key)) = server.tautulli_endpoint() {
            entry.source = "tautulli";
            match state.jobs.tautulli.activity(url, api_key).await {
                Ok(sessions) => {
                    entry.sessions = sessions
                        .into_iter()
                        .map(|s| ActivitySession {
                            user: s.friendly_name,
                            title: s.full_title,
                            player: s.player,
                            state: s.state,
                        })
                        .collect();
                }
                Err(e) => {
                    tracing::warn!(server = %server.name, error = %e, "Tautulli activity failed");
                    entry.error = Some(e.to_string());
                }
            }
        } else if let Some((url, token)) = server.plex_endpoint() {
            entry.source = "plex";
            match state.jobs.plex.sessions(url, token).await {
                Ok(sessions) => {
                    entry.sessions = sessions
                        .into_iter()
                        .map(|s| ActivitySession {
                            user: s.user,
                            title: Some(s.title),
                            player: s.player,
                            state: None,
                        })
                        .collect();
                }
                Err(e) => {
                    tracing::warn!(server = %server.name, error = %e, "Plex sessions failed");
                    entry.error = Some(e.to_string());
                }
            }
        }

        activity.push(entry);
    }

    Ok(Json(activity))
}
