//! Expiration reminder emails

use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use vodum_shared::dates::{now_rfc3339, parse_expiration_date};
use vodum_shared::event_log::{record_event, LogLevel};
use vodum_shared::locks;
use vodum_shared::settings::{load_settings, load_templates};
use vodum_shared::{EmailTemplate, ReminderKind, UserRecord};

use crate::error::JobResult;
use crate::mailer::{MailTransport, OutgoingMail};

/// Name of the advisory lock guarding concurrent reminder runs
pub const REMINDER_LOCK: &str = "reminder_lock";

/// A lock held this long is assumed to belong to a crashed run
pub const REMINDER_LOCK_STALE_HOURS: i64 = 6;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReminderSummary {
    /// Another run held the lock
    pub locked_out: bool,
    pub enabled: bool,
    pub eligible_users: usize,
    pub sent: usize,
    pub already_sent: usize,
    pub failed: usize,
}

/// Substitute `{name}` placeholders. Unknown names render empty,
/// `{{` and `}}` produce literal braces, an unclosed `{` is kept as is.
pub fn render_template(template: &str, vars: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
        } else if tail.starts_with('{') {
            match tail.find('}') {
                Some(end) => {
                    let name = tail[1..end].trim();
                    if let Some((_, value)) = vars.iter().find(|(k, _)| *k == name) {
                        out.push_str(value);
                    }
                    rest = &tail[end + 1..];
                }
                None => {
                    out.push_str(tail);
                    rest = "";
                }
            }
        } else {
            out.push('}');
            rest = &tail[1..];
        }
    }

    out.push_str(rest);
    out
}

/// A template applies when `0 <= days_left <= days_before`
pub fn template_applies(template: &EmailTemplate, kind: ReminderKind, days_left: i64) -> bool {
    let days_before = template.days_before.unwrap_or_else(|| kind.default_days());
    (0..=days_before).contains(&days_left)
}

fn recipients(user: &UserRecord) -> Vec<String> {
    let mut addresses: Vec<String> = Vec::new();
    for address in [user.email.as_deref(), user.second_email.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|a| !a.is_empty())
    {
        if !addresses.iter().any(|a| a.eq_ignore_ascii_case(address)) {
            addresses.push(address.to_string());
        }
    }
    addresses
}

/// Send due reminders under the `reminder_lock` advisory lock
pub async fn send_reminders<M>(
    pool: &SqlitePool,
    mailer: &M,
    send_delay: Duration,
) -> JobResult<ReminderSummary>
where
    M: MailTransport + ?Sized,
{
    let stale_after = chrono::Duration::hours(REMINDER_LOCK_STALE_HOURS);
    if !locks::try_acquire(pool, REMINDER_LOCK, stale_after).await? {
        tracing::info!("Reminder run already in progress, skipping");
        return Ok(ReminderSummary {
            locked_out: true,
            ..Default::default()
        });
    }

    let result = send_reminders_locked(pool, mailer, send_delay).await;

    if let Err(e) = locks::release(pool, REMINDER_LOCK).await {
        tracing::error!(error = %e, "Failed to release reminder lock");
    }
    result
}

async fn send_reminders_locked<M>(
    pool: &SqlitePool,
    mailer: &M,
    send_delay: Duration,
) -> JobResult<ReminderSummary>
where
    M: MailTransport + ?Sized,
{
    let settings = load_settings(pool).await?;
    if !settings.send_reminders {
        tracing::debug!("Reminder emails disabled in settings");
        return Ok(ReminderSummary::default());
    }

    let templates: Vec<(ReminderKind, EmailTemplate)> = load_templates(pool)
        .await?
        .into_iter()
        .filter_map(|t| {
            let kind = ReminderKind::ALL.into_iter().find(|k| k.as_str() == t.kind)?;
            Some((kind, t))
        })
        .collect();

    let users = sqlx::query_as::<_, UserRecord>(&format!(
        r#"
        SELECT {} FROM users
        WHERE expiration_date IS NOT NULL AND TRIM(expiration_date) != ''
          AND (status IS NULL OR status != 'unfriended')
          AND email IS NOT NULL AND TRIM(email) != ''
        ORDER BY id
        "#,
        UserRecord::COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    let today = Utc::now().date_naive();
    let mut summary = ReminderSummary {
        enabled: true,
        ..Default::default()
    };

    for user in &users {
        let (Some(snapshot), Some(expiration)) = (
            user.expiration_date.as_deref(),
            user.expiration_date.as_deref().and_then(parse_expiration_date),
        ) else {
            continue;
        };
        summary.eligible_users += 1;
        let days_left = days_until(expiration, today);

        for (kind, template) in &templates {
            if !template_applies(template, *kind, days_left) {
                continue;
            }

            let (already,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM sent_emails WHERE user_id = ?1 AND type = ?2 AND expiration_snapshot = ?3",
            )
            .bind(user.id)
            .bind(kind.as_str())
            .bind(snapshot)
            .fetch_one(pool)
            .await?;
            if already > 0 {
                summary.already_sent += 1;
                continue;
            }

            let vars = [
                ("username", user.username.clone()),
                ("days_left", days_left.to_string()),
            ];
            let subject = render_template(&template.subject, &vars);
            let body = render_template(&template.body, &vars);

            let mut delivered = true;
            for address in recipients(user) {
                if let Err(e) = mailer.send(&OutgoingMail::html(&address, &subject, &body)).await {
                    delivered = false;
                    tracing::error!(user_id = user.id, kind = kind.as_str(), error = %e, "Reminder send failed");
                }
            }

            if !delivered {
                summary.failed += 1;
                record_event(
                    pool,
                    LogLevel::Error,
                    &format!("Reminder {} to {} failed", kind.as_str(), user.username),
                )
                .await;
                continue;
            }

            sqlx::query(
                "INSERT INTO sent_emails (user_id, type, date_sent, expiration_snapshot) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(user.id)
            .bind(kind.as_str())
            .bind(now_rfc3339())
            .bind(snapshot)
            .execute(pool)
            .await?;

            summary.sent += 1;
            tracing::info!(user_id = user.id, kind = kind.as_str(), days_left, "Reminder sent");

            if !send_delay.is_zero() {
                tokio::time::sleep(send_delay).await;
            }
        }
    }

    record_event(
        pool,
        LogLevel::Info,
        &format!("Reminders: {} sent, {} failed", summary.sent, summary.failed),
    )
    .await;

    Ok(summary)
}

fn days_until(expiration: NaiveDate, today: NaiveDate) -> i64 {
    (expiration - today).num_days()
}
