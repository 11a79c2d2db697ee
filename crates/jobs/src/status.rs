//! Subscription status derivation

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use vodum_shared::dates::{now_rfc3339, parse_expiration};
use vodum_shared::event_log::{record_event, LogLevel};
use vodum_shared::settings::{find_admin_token, load_thresholds};
use vodum_shared::{
    is_guest_username, FriendState, StatusThresholds, SubscriptionStatus, UserRecord,
};

use crate::error::JobResult;
use crate::plex::{FriendDirectory, PlexClient};

/// Everything the status decision looks at for one user
#[derive(Debug, Clone)]
pub struct StatusInputs<'a> {
    pub stored: Option<SubscriptionStatus>,
    pub is_admin: bool,
    pub username: &'a str,
    pub has_libraries: bool,
    pub friend: FriendState,
    pub expiration: Option<DateTime<Utc>>,
}

/// Whole days until `expiration`, rounding half days up
pub fn days_remaining(expiration: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let days = (expiration - now).num_milliseconds() as f64 / 86_400_000.0;
    (days + 0.5).floor() as i64
}

/// Decide a user's status. The first matching rule wins.
pub fn compute_subscription_status(
    inputs: &StatusInputs<'_>,
    thresholds: &StatusThresholds,
    now: DateTime<Utc>,
) -> SubscriptionStatus {
    if inputs.stored == Some(SubscriptionStatus::Suspended) {
        return SubscriptionStatus::Suspended;
    }
    if inputs.is_admin {
        return SubscriptionStatus::Active;
    }
    if is_guest_username(inputs.username) && !inputs.has_libraries {
        return SubscriptionStatus::Unknown;
    }
    if !inputs.has_libraries {
        return match inputs.friend {
            FriendState::False => SubscriptionStatus::Unfriended,
            FriendState::True => SubscriptionStatus::Expired,
            FriendState::Unknown => SubscriptionStatus::Unknown,
        };
    }

    let Some(expiration) = inputs.expiration else {
        return SubscriptionStatus::Active;
    };

    let days = days_remaining(expiration, now);
    if days < -thresholds.fin_days {
        SubscriptionStatus::Expired
    } else if days <= thresholds.relance_days {
        SubscriptionStatus::Reminder
    } else if days < thresholds.preavis_days {
        SubscriptionStatus::PreExpired
    } else {
        SubscriptionStatus::Active
    }
}

/// How friend-state is resolved for one run
pub enum FriendResolver {
    /// Friends list fetched from Plex.tv
    Remote(FriendDirectory),
    /// The friends fetch failed; nobody's state is known
    Unavailable,
    /// No admin token: local `user_servers` rows stand in for friendship
    LocalGrants {
        has_servers: bool,
        linked_users: HashSet<i64>,
    },
}

impl FriendResolver {
    pub async fn load(pool: &SqlitePool, plex: &PlexClient) -> JobResult<Self> {
        if let Some(token) = find_admin_token(pool).await? {
            return Ok(match plex.friends(&token).await {
                Ok(directory) => {
                    tracing::debug!(friends = directory.len(), "Loaded Plex friends");
                    FriendResolver::Remote(directory)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Could not load Plex friends, friend state unknown");
                    FriendResolver::Unavailable
                }
            });
        }

        let (servers,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM servers")
            .fetch_one(pool)
            .await?;
        let linked: Vec<(i64,)> = sqlx::query_as("SELECT DISTINCT user_id FROM user_servers")
            .fetch_all(pool)
            .await?;

        Ok(FriendResolver::LocalGrants {
            has_servers: servers > 0,
            linked_users: linked.into_iter().map(|(id,)| id).collect(),
        })
    }

    pub fn resolve(&self, user: &UserRecord) -> FriendState {
        match self {
            FriendResolver::Remote(directory) => FriendState::from(directory.contains(
                user.plex_id.as_deref(),
                user.email.as_deref(),
                Some(user.username.as_str()),
            )),
            FriendResolver::Unavailable => FriendState::Unknown,
            FriendResolver::LocalGrants {
                has_servers,
                linked_users,
            } => {
                if linked_users.contains(&user.id) {
                    FriendState::True
                } else if !has_servers {
                    FriendState::Unknown
                } else {
                    FriendState::False
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSummary {
    pub checked: usize,
    pub changed: usize,
    pub by_status: BTreeMap<String, usize>,
}

/// Users holding at least one grant in either grant table
pub async fn users_with_libraries(pool: &SqlitePool) -> JobResult<HashSet<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT user_id FROM user_libraries UNION SELECT user_id FROM shared_libraries",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Write a status change, keeping the previous value in `last_status`
pub async fn set_user_status(
    pool: &SqlitePool,
    user_id: i64,
    status: SubscriptionStatus,
) -> JobResult<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET last_status = status, status = ?1, status_changed_at = ?2
        WHERE id = ?3
        "#,
    )
    .bind(status.as_str())
    .bind(now_rfc3339())
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Recompute every user's status and persist the ones that changed
pub async fn update_user_status(pool: &SqlitePool, plex: &PlexClient) -> JobResult<StatusSummary> {
    let thresholds = load_thresholds(pool).await?;
    let friends = FriendResolver::load(pool, plex).await?;
    let with_libraries = users_with_libraries(pool).await?;

    let users = sqlx::query_as::<_, UserRecord>(&format!(
        "SELECT {} FROM users ORDER BY id",
        UserRecord::COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    let now = Utc::now();
    let mut summary = StatusSummary::default();

    for user in &users {
        let inputs = StatusInputs {
            stored: user.subscription_status(),
            is_admin: user.is_admin,
            username: &user.username,
            has_libraries: with_libraries.contains(&user.id) || user.has_library_access_field(),
            friend: friends.resolve(user),
            expiration: user.expiration_date.as_deref().and_then(parse_expiration),
        };
        let status = compute_subscription_status(&inputs, &thresholds, now);

        summary.checked += 1;
        *summary.by_status.entry(status.to_string()).or_default() += 1;

        if user.status.as_deref() == Some(status.as_str()) {
            continue;
        }

        set_user_status(pool, user.id, status).await?;
        summary.changed += 1;
        tracing::info!(
            user_id = user.id,
            username = %user.username,
            from = user.status.as_deref().unwrap_or("none"),
            to = %status,
            "User status changed"
        );
    }

    tracing::info!(
        checked = summary.checked,
        changed = summary.changed,
        "User status update complete"
    );
    record_event(
        pool,
        LogLevel::Info,
        &format!(
            "User status updated: {} checked, {} changed",
            summary.checked, summary.changed
        ),
    )
    .await;

    Ok(summary)
}
