//! Common types used across Vodum

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// =============================================================================
// Enums
// =============================================================================

/// Subscription status persisted in `users.status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PreExpired,
    Reminder,
    Expired,
    Suspended,
    Unfriended,
    Unknown,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PreExpired => "pre_expired",
            Self::Reminder => "reminder",
            Self::Expired => "expired",
            Self::Suspended => "suspended",
            Self::Unfriended => "unfriended",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a stored value; blank or unrecognised values are None.
    pub fn from_stored(value: Option<&str>) -> Option<Self> {
        value.and_then(|v| v.trim().parse().ok())
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "pre_expired" => Ok(Self::PreExpired),
            "reminder" => Ok(Self::Reminder),
            "expired" => Ok(Self::Expired),
            "suspended" => Ok(Self::Suspended),
            "unfriended" => Ok(Self::Unfriended),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("Invalid subscription status: {}", s)),
        }
    }
}

/// Whether the server owner counts a user among their Plex friends.
/// Derived per run, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendState {
    True,
    False,
    Unknown,
}

impl FriendState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::True => "true",
            Self::False => "false",
            Self::Unknown => "unknown",
        }
    }
}

impl From<bool> for FriendState {
    fn from(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }
}

/// Reminder template kinds, in the order they are evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderKind {
    /// Early notice ("préavis")
    Preavis,
    /// Follow-up reminder ("relance")
    Relance,
    /// End of subscription ("fin")
    Fin,
}

impl ReminderKind {
    pub const ALL: [ReminderKind; 3] = [Self::Preavis, Self::Relance, Self::Fin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preavis => "preavis",
            Self::Relance => "relance",
            Self::Fin => "fin",
        }
    }

    /// Threshold used when the template row is missing or has no value
    pub fn default_days(&self) -> i64 {
        match self {
            Self::Preavis => 30,
            Self::Relance => 7,
            Self::Fin => 0,
        }
    }
}

/// Day thresholds driving status derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusThresholds {
    pub preavis_days: i64,
    pub relance_days: i64,
    pub fin_days: i64,
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            preavis_days: ReminderKind::Preavis.default_days(),
            relance_days: ReminderKind::Relance.default_days(),
            fin_days: ReminderKind::Fin.default_days(),
        }
    }
}

/// The shared guest account never holds a subscription of its own
pub fn is_guest_username(username: &str) -> bool {
    username.trim().eq_ignore_ascii_case("guest")
}

// =============================================================================
// Database Records
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub plex_id: Option<String>,
    pub username: String,
    pub email: Option<String>,
    pub second_email: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub avatar: Option<String>,
    pub is_admin: bool,
    pub status: Option<String>,
    pub last_status: Option<String>,
    pub status_changed_at: Option<String>,
    pub expiration_date: Option<String>,
    pub library_access: Option<String>,
    pub discord_user_id: Option<String>,
}

impl UserRecord {
    /// Column list matching the struct, for `SELECT {USER_COLUMNS} FROM users`
    pub const COLUMNS: &'static str = "id, plex_id, username, email, second_email, firstname, \
        lastname, avatar, is_admin, status, last_status, status_changed_at, expiration_date, \
        library_access, discord_user_id";

    pub fn subscription_status(&self) -> Option<SubscriptionStatus> {
        SubscriptionStatus::from_stored(self.status.as_deref())
    }

    /// Section ids listed in the legacy `library_access` CSV
    pub fn library_access_ids(&self) -> Vec<i64> {
        parse_library_access(self.library_access.as_deref())
    }

    /// Any non-blank legacy `library_access` value counts as holding access
    pub fn has_library_access_field(&self) -> bool {
        self.library_access
            .as_deref()
            .is_some_and(|v| !v.trim().is_empty())
    }
}

/// Parse the comma separated section id list; non-numeric entries are dropped
pub fn parse_library_access(value: Option<&str>) -> Vec<i64> {
    value
        .unwrap_or_default()
        .split(',')
        .filter_map(|id| id.trim().parse::<i64>().ok())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ServerRecord {
    pub id: i64,
    pub server_identifier: Option<String>,
    pub name: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub server_type: String,
    pub plex_url: Option<String>,
    #[serde(skip_serializing)]
    pub plex_token: Option<String>,
    pub plex_status: Option<String>,
    pub tautulli_url: Option<String>,
    #[serde(skip_serializing)]
    pub tautulli_api_key: Option<String>,
    pub tautulli_status: Option<String>,
    pub local_url: Option<String>,
    pub public_url: Option<String>,
    pub last_checked: Option<String>,
}

impl ServerRecord {
    pub const COLUMNS: &'static str = "id, server_identifier, name, type, plex_url, plex_token, \
        plex_status, tautulli_url, tautulli_api_key, tautulli_status, local_url, public_url, \
        last_checked";

    /// Url and token, when both are configured
    pub fn plex_endpoint(&self) -> Option<(&str, &str)> {
        let url = self.plex_url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
        let token = self.plex_token.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
        Some((url.trim_end_matches('/'), token))
    }

    /// Tautulli url and api key, when both are configured
    pub fn tautulli_endpoint(&self) -> Option<(&str, &str)> {
        let url = self.tautulli_url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
        let key = self
            .tautulli_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())?;
        Some((url.trim_end_matches('/'), key))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LibraryRecord {
    pub id: i64,
    pub section_id: i64,
    pub name: String,
    pub server_identifier: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmailTemplate {
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub subject: String,
    pub body: String,
    pub days_before: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MailCampaign {
    pub id: i64,
    pub subject: Option<String>,
    pub html_content: Option<String>,
    pub attachment_path: Option<String>,
    pub status: String,
    pub created_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MailQueueEntry {
    pub id: i64,
    pub campaign_id: i64,
    pub user_id: Option<i64>,
    pub email: Option<String>,
    pub status: String,
    pub error: Option<String>,
    pub sent_at: Option<String>,
}
