//! Tautulli API v2 client

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::plex::{PlexError, PlexResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: ResponseBody<T>,
}

#[derive(Debug, Deserialize)]
struct ResponseBody<T> {
    result: String,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
struct ActivityData {
    #[serde(default)]
    sessions: Vec<TautulliSession>,
}

/// A stream reported by `get_activity`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TautulliSession {
    #[serde(default)]
    pub friendly_name: Option<String>,
    #[serde(default)]
    pub full_title: Option<String>,
    #[serde(default)]
    pub player: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TautulliClient {
    http: Client,
}

impl TautulliClient {
    pub fn new() -> PlexResult<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http })
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        base_url: &str,
        api_key: &str,
        cmd: &str,
    ) -> PlexResult<Option<T>> {
        let url = format!("{}/api/v2", base_url.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .query(&[("apikey", api_key), ("cmd", cmd)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PlexError::Status {
                status: status.as_u16(),
                url: "/api/v2".to_string(),
            });
        }

        let envelope: Envelope<T> = serde_json::from_str(&response.text().await?)?;
        if envelope.response.result != "success" {
            return Err(PlexError::NotFound(
                envelope
                    .response
                    .message
                    .unwrap_or_else(|| format!("tautulli {} failed", cmd)),
            ));
        }
        Ok(envelope.response.data)
    }

    /// Returns Ok when Tautulli answers `cmd=status` with success
    pub async fn status(&self, base_url: &str, api_key: &str) -> PlexResult<()> {
        self.call::<serde_json::Value>(base_url, api_key, "status")
            .await
            .map(|_| ())
    }

    pub async fn activity(&self, base_url: &str, api_key: &str) -> PlexResult<Vec<TautulliSession>> {
        let data: Option<ActivityData> = self.call(base_url, api_key, "get_activity").await?;
        Ok(data.unwrap_or_default().sessions)
    }
}
