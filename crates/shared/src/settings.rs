//! Accessors for the single-row `settings` table and the reminder templates

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::error::{VodumError, VodumResult};
use crate::types::{EmailTemplate, ReminderKind, StatusThresholds};

/// Runtime settings edited from the panel
#[derive(Debug, Clone, Default, Serialize, Deserialize, FromRow)]
pub struct Settings {
    pub smtp_host: Option<String>,
    pub smtp_port: Option<i64>,
    pub smtp_user: Option<String>,
    #[serde(skip_serializing)]
    pub smtp_pass: Option<String>,
    pub mail_from: Option<String>,
    pub timezone: Option<String>,
    pub send_reminders: bool,
    pub disable_on_expiry: bool,
    pub delete_after_expiry_days: Option<i64>,
    #[serde(skip_serializing)]
    pub plex_auth_token: Option<String>,
}

/// SMTP credentials resolved from [`Settings`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from: String,
}

pub const DEFAULT_SMTP_PORT: u16 = 587;

impl Settings {
    /// Resolve the SMTP block. Every field except the port is required.
    pub fn smtp(&self) -> VodumResult<SmtpSettings> {
        fn required(value: &Option<String>, name: &str) -> VodumResult<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| VodumError::Config(format!("SMTP setting {} is missing", name)))
        }

        let port = match self.smtp_port {
            None => DEFAULT_SMTP_PORT,
            Some(p) => u16::try_from(p)
                .map_err(|_| VodumError::Config(format!("SMTP port {} is out of range", p)))?,
        };

        Ok(SmtpSettings {
            host: required(&self.smtp_host, "smtp_host")?,
            port,
            user: required(&self.smtp_user, "smtp_user")?,
            password: required(&self.smtp_pass, "smtp_pass")?,
            from: required(&self.mail_from, "mail_from")?,
        })
    }

    pub fn timezone_name(&self) -> &str {
        self.timezone
            .as_deref()
            .map(str::trim)
            .filter(|tz| !tz.is_empty())
            .unwrap_or("UTC")
    }
}

/// Load the settings row. A database without the row yields defaults.
pub async fn load_settings(pool: &SqlitePool) -> VodumResult<Settings> {
    let settings = sqlx::query_as::<_, Settings>(
        r#"
        SELECT smtp_host, smtp_port, smtp_user, smtp_pass, mail_from, timezone,
               send_reminders, disable_on_expiry, delete_after_expiry_days, plex_auth_token
        FROM settings
        WHERE id = 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    Ok(settings.unwrap_or_default())
}

/// Load every reminder template, ordered preavis, relance, fin
pub async fn load_templates(pool: &SqlitePool) -> VodumResult<Vec<EmailTemplate>> {
    let mut templates = sqlx::query_as::<_, EmailTemplate>(
        "SELECT type, subject, body, days_before FROM email_templates",
    )
    .fetch_all(pool)
    .await?;

    templates.sort_by_key(|t| {
        ReminderKind::ALL
            .iter()
            .position(|k| k.as_str() == t.kind)
            .unwrap_or(usize::MAX)
    });
    Ok(templates)
}

/// Thresholds from `email_templates.days_before`, defaulting per kind
pub async fn load_thresholds(pool: &SqlitePool) -> VodumResult<StatusThresholds> {
    let templates = load_templates(pool).await?;
    let days = |kind: ReminderKind| {
        templates
            .iter()
            .find(|t| t.kind == kind.as_str())
            .and_then(|t| t.days_before)
            .unwrap_or_else(|| kind.default_days())
    };

    Ok(StatusThresholds {
        preavis_days: days(ReminderKind::Preavis),
        relance_days: days(ReminderKind::Relance),
        fin_days: days(ReminderKind::Fin),
    })
}

/// Token used for Plex.tv account-level calls.
/// Prefers the most recently checked server token, then the settings fallback.
pub async fn find_admin_token(pool: &SqlitePool) -> VodumResult<Option<String>> {
    let server_token: Option<(String,)> = sqlx::query_as(
        r#"
        SELECT plex_token FROM servers
        WHERE plex_token IS NOT NULL AND TRIM(plex_token) != ''
        ORDER BY last_checked IS NULL, last_checked DESC, id
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    if let Some((token,)) = server_token {
        return Ok(Some(token.trim().to_string()));
    }

    let settings = load_settings(pool).await?;
    Ok(settings
        .plex_auth_token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty()))
}
