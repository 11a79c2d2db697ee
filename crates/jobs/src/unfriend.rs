//! Remove long-expired users from the owner's Plex friends

use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use vodum_shared::dates::parse_expiration_date;
use vodum_shared::event_log::{record_event, LogLevel};
use vodum_shared::settings::{find_admin_token, load_settings};
use vodum_shared::{is_guest_username, SubscriptionStatus, UserRecord};

use crate::error::JobResult;
use crate::plex::PlexClient;
use crate::status::set_user_status;

#[derive(Debug, Clone, Default, Serialize)]
pub struct UnfriendSummary {
    pub enabled: bool,
    pub candidates: usize,
    pub unfriended: usize,
    pub remote_failures: usize,
}

/// True once the expiration (or, failing that, the last status change)
/// plus the delay lies before today
pub fn is_due_for_unfriend(user: &UserRecord, delay_days: i64, today: NaiveDate) -> bool {
    if user.is_admin || is_guest_username(&user.username) {
        return false;
    }
    if user.subscription_status() != Some(SubscriptionStatus::Expired) {
        return false;
    }

    let reference = user
        .expiration_date
        .as_deref()
        .and_then(parse_expiration_date)
        .or_else(|| user.status_changed_at.as_deref().and_then(parse_expiration_date));

    let Some(reference) = reference else {
        return false;
    };
    match Duration::try_days(delay_days).and_then(|d| reference.checked_add_signed(d)) {
        Some(due) => due < today,
        None => {
            tracing::warn!(
                user_id = user.id,
                delay_days,
                "Unfriend delay out of range, user not due"
            );
            false
        }
    }
}

pub async fn delete_expired_users(pool: &SqlitePool, plex: &PlexClient) -> JobResult<UnfriendSummary> {
    let settings = load_settings(pool).await?;
    let Some(delay_days) = settings.delete_after_expiry_days else {
        tracing::debug!("Unfriending disabled in settings");
        return Ok(UnfriendSummary::default());
    };

    let Some(token) = find_admin_token(pool).await? else {
        tracing::warn!("No Plex admin token, cannot unfriend expired users");
        record_event(pool, LogLevel::Warn, "Unfriend skipped: no Plex admin token").await;
        return Ok(UnfriendSummary {
            enabled: true,
            ..Default::default()
        });
    };

    let users = sqlx::query_as::<_, UserRecord>(&format!(
        "SELECT {} FROM users WHERE status = 'expired' AND is_admin = 0 ORDER BY id",
        UserRecord::COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    let today = Utc::now().date_naive();
    let candidates: Vec<&UserRecord> = users
        .iter()
        .filter(|u| is_due_for_unfriend(u, delay_days, today))
        .collect();

    let mut summary = UnfriendSummary {
        enabled: true,
        candidates: candidates.len(),
        ..Default::default()
    };

    for user in candidates {
        if let Some(plex_id) = user.plex_id.as_deref() {
            if let Err(e) = plex.remove_friend(&token, plex_id).await {
                summary.remote_failures += 1;
                tracing::error!(user_id = user.id, error = %e, "Failed to remove Plex friend");
            }
        }

        for table in ["user_servers", "user_libraries", "shared_libraries"] {
            sqlx::query(&format!("DELETE FROM {} WHERE user_id = ?1", table))
                .bind(user.id)
                .execute(pool)
                .await?;
        }
        sqlx::query("UPDATE users SET library_access = NULL WHERE id = ?1")
            .bind(user.id)
            .execute(pool)
            .await?;
        set_user_status(pool, user.id, SubscriptionStatus::Unfriended).await?;

        summary.unfriended += 1;
        tracing::info!(user_id = user.id, username = %user.username, "User unfriended");
    }

    record_event(
        pool,
        LogLevel::Info,
        &format!(
            "Unfriend: {} users unfriended ({} Plex failures)",
            summary.unfriended, summary.remote_failures
        ),
    )
    .await;

    Ok(summary)
}
