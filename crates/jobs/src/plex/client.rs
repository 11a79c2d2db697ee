//! HTTP client for Plex.tv and Plex Media Server

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use super::types::*;
use super::xml::{self, XmlNode};
use super::{PlexError, PlexResult};

/// Timeout for Plex requests (20 seconds)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Total attempts for a request that keeps failing transiently
const MAX_ATTEMPTS: usize = 3;

/// Initial backoff for retries (100ms)
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Maximum backoff for retries (5 seconds)
const RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

const CLIENT_IDENTIFIER: &str = "vodum";
const PRODUCT: &str = "Vodum";

#[derive(Debug, Clone)]
pub struct PlexClient {
    http: Client,
    plex_tv_url: String,
}

impl PlexClient {
    pub fn new(plex_tv_url: &str) -> PlexResult<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .pool_max_idle_per_host(4)
            .build()?;

        Ok(Self {
            http,
            plex_tv_url: plex_tv_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn plex_tv_url(&self) -> &str {
        &self.plex_tv_url
    }

    fn request(&self, method: Method, url: &str, token: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("X-Plex-Token", token)
            .header("X-Plex-Client-Identifier", CLIENT_IDENTIFIER)
            .header("X-Plex-Product", PRODUCT)
    }

    async fn send_once(request: RequestBuilder) -> PlexResult<String> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PlexError::Status {
                status: status.as_u16(),
                url: response.url().path().to_string(),
            });
        }
        Ok(response.text().await?)
    }

    /// Send a request, retrying transient failures with exponential backoff
    async fn send_with_retry<F>(&self, build: F) -> PlexResult<String>
    where
        F: Fn() -> RequestBuilder,
    {
        let retry_strategy = ExponentialBackoff::from_millis(RETRY_BASE_DELAY.as_millis() as u64)
            .max_delay(RETRY_MAX_DELAY)
            .take(MAX_ATTEMPTS - 1)
            .map(jitter);

        let build = &build;
        Retry::spawn(retry_strategy, move || async move {
            let result = Self::send_once(build()).await;
            match &result {
                Ok(_) => Ok(result),
                Err(e) if e.is_transient() => {
                    tracing::debug!(error = %e, "Transient Plex error - will retry");
                    Err(result)
                }
                Err(_) => Ok(result),
            }
        })
        .await
        .unwrap_or_else(|e| e)
    }

    async fn get_xml(&self, url: &str, token: &str) -> PlexResult<XmlNode> {
        let body = self
            .send_with_retry(|| {
                self.request(Method::GET, url, token)
                    .header("Accept", "application/xml")
            })
            .await?;
        xml::parse(&body)
    }

    fn tv(&self, path: &str) -> String {
        format!("{}{}", self.plex_tv_url, path)
    }

    /// Owner account of a token
    pub async fn account(&self, token: &str) -> PlexResult<PlexAccount> {
        let doc = self.get_xml(&self.tv("/users/account"), token).await?;
        PlexAccount::from_xml(&doc)
    }

    /// Users the account shares with, plus managed home users.
    /// A failing home-users call is tolerated.
    pub async fn users(&self, token: &str) -> PlexResult<Vec<PlexUser>> {
        let doc = self.get_xml(&self.tv("/api/users"), token).await?;
        let mut users = PlexUser::list_from_xml(&doc);

        match self.get_xml(&self.tv("/api/home/users"), token).await {
            Ok(home) => {
                for user in PlexUser::list_from_xml(&home) {
                    if !users.iter().any(|u| u.id == user.id) {
                        users.push(user);
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "Could not load Plex home users"),
        }

        Ok(users)
    }

    /// Friends list, trying the media-server friends endpoint first
    pub async fn friends(&self, token: &str) -> PlexResult<FriendDirectory> {
        match self.get_xml(&self.tv("/pms/friends/all"), token).await {
            Ok(doc) => Ok(FriendDirectory::from_xml(&doc)),
            Err(e) => {
                tracing::debug!(error = %e, "Falling back to /api/friends");
                let doc = self.get_xml(&self.tv("/api/friends"), token).await?;
                Ok(FriendDirectory::from_xml(&doc))
            }
        }
    }

    pub async fn resources(&self, token: &str) -> PlexResult<Vec<PlexResource>> {
        let doc = self
            .get_xml(&self.tv("/api/resources?includeHttps=1"), token)
            .await?;
        Ok(PlexResource::list_from_xml(&doc))
    }

    pub async fn shared_servers(
        &self,
        token: &str,
        machine_identifier: &str,
    ) -> PlexResult<Vec<SharedServer>> {
        let url = self.tv(&format!("/api/servers/{}/shared_servers", machine_identifier));
        let doc = self.get_xml(&url, token).await?;
        Ok(SharedServer::list_from_xml(&doc))
    }

    pub async fn server_identity(&self, base_url: &str, token: &str) -> PlexResult<String> {
        let url = format!("{}/identity", base_url.trim_end_matches('/'));
        let doc = self.get_xml(&url, token).await?;
        machine_identifier_from_xml(&doc)
    }

    pub async fn library_sections(
        &self,
        base_url: &str,
        token: &str,
    ) -> PlexResult<Vec<LibrarySection>> {
        let url = format!("{}/library/sections", base_url.trim_end_matches('/'));
        let doc = self.get_xml(&url, token).await?;
        Ok(LibrarySection::list_from_xml(&doc))
    }

    pub async fn sessions(&self, base_url: &str, token: &str) -> PlexResult<Vec<PlexSession>> {
        let url = format!("{}/status/sessions", base_url.trim_end_matches('/'));
        let doc = self.get_xml(&url, token).await?;
        Ok(PlexSession::list_from_xml(&doc))
    }

    /// Replace the sections shared through a grant; an empty list revokes all access
    pub async fn update_shared_server_sections(
        &self,
        token: &str,
        shared_server_id: &str,
        machine_identifier: &str,
        section_ids: &[i64],
    ) -> PlexResult<()> {
        let url = self.tv(&format!("/api/v2/shared_servers/{}", shared_server_id));
        let body = serde_json::json!({
            "machineIdentifier": machine_identifier,
            "librarySectionIds": section_ids,
        });

        self.send_with_retry(|| {
            self.request(Method::POST, &url, token)
                .header("Accept", "application/json")
                .json(&body)
        })
        .await?;
        Ok(())
    }

    pub async fn remove_friend(&self, token: &str, friend_id: &str) -> PlexResult<()> {
        let url = self.tv(&format!("/api/v2/friends/{}", friend_id));
        self.send_with_retry(|| {
            self.request(Method::DELETE, &url, token)
                .header("Accept", "application/json")
        })
        .await?;
        Ok(())
    }
}
