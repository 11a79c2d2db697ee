//! User management routes

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use vodum_jobs::status::set_user_status;
use vodum_shared::dates::parse_expiration_date;
use vodum_shared::{LibraryRecord, SubscriptionStatus, UserRecord};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<UserRecord>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct UserDetailResponse {
    #[serde(flatten)]
    pub user: UserRecord,
    pub libraries: Vec<LibraryRecord>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionRequest {
    /// Days of access granted from the start date
    pub days: i64,
    /// Defaults to today
    pub start_date: Option<String>,
}

// =============================================================================
// Helpers
// =============================================================================

async fn load_user(state: &AppState, id: i64) -> ApiResult<UserRecord> {
    sqlx::query_as::<_, UserRecord>(&format!(
        "SELECT {} FROM users WHERE id = ?1",
        UserRecord::COLUMNS
    ))
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(ApiError::NotFound)
}

// =============================================================================
// Handlers
// =============================================================================

/// List users, optionally filtered by status
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> ApiResult<Json<UserListResponse>> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            s.parse::<SubscriptionStatus>()
                .map_err(ApiError::Validation)
        })
        .transpose()?;

    let users = sqlx::query_as::<_, UserRecord>(&format!(
        "SELECT {} FROM users WHERE ?1 IS NULL OR status = ?1 ORDER BY username COLLATE NOCASE",
        UserRecord::COLUMNS
    ))
    .bind(status.map(|s| s.as_str()))
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(UserListResponse {
        total: users.len(),
        users,
    }))
}

/// One user with the libraries they hold
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<UserDetailResponse>> {
    let user = load_user(&state, id).await?;

    let libraries = sqlx::query_as::<_, LibraryRecord>(
        r#"
        SELECT l.id, l.section_id, l.name, l.server_identifier
        FROM libraries l
        JOIN user_libraries ul ON ul.library_id = l.id
        WHERE ul.user_id = ?1
        ORDER BY l.name
        "#,
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(UserDetailResponse { user, libraries }))
}

/// Force a user into `suspended`
pub async fn suspend_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<UserRecord>> {
    let user = load_user(&state, id).await?;
    if user.subscription_status() == Some(SubscriptionStatus::Suspended) {
        return Ok(Json(user));
    }

    set_user_status(&state.pool, id, SubscriptionStatus::Suspended).await?;
    tracing::info!(user_id = id, username = %user.username, "User suspended");

    Ok(Json(load_user(&state, id).await?))
}

/// Lift a suspension, restoring the status held before it
pub async fn unsuspend_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<UserRecord>> {
    let user = load_user(&state, id).await?;
    if user.subscription_status() != Some(SubscriptionStatus::Suspended) {
        return Err(ApiError::Validation("User is not suspended".to_string()));
    }

    let restored = SubscriptionStatus::from_stored(user.last_status.as_deref())
        .filter(|s| *s != SubscriptionStatus::Suspended)
        .unwrap_or(SubscriptionStatus::Unknown);
    set_user_status(&state.pool, id, restored).await?;
    tracing::info!(user_id = id, username = %user.username, status = %restored, "User unsuspended");

    Ok(Json(load_user(&state, id).await?))
}

/// Set the expiration date to `start_date + days`
pub async fn set_subscription(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<SubscriptionRequest>,
) -> ApiResult<Json<UserRecord>> {
    if body.days <= 0 {
        return Err(ApiError::Validation("days must be positive".to_string()));
    }

    let start = match body.start_date.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_expiration_date(raw)
            .ok_or_else(|| ApiError::Validation(format!("Invalid start_date: {}", raw)))?,
        None => Utc::now().date_naive(),
    };
    let expiration = Duration::try_days(body.days)
        .and_then(|d| start.checked_add_signed(d))
        .ok_or_else(|| ApiError::Validation("days is out of range".to_string()))?
        .format("%Y-%m-%d")
        .to_string();

    let updated = sqlx::query("UPDATE users SET expiration_date = ?1 WHERE id = ?2")
        .bind(&expiration)
        .bind(id)
        .execute(&state.pool)
        .await?
        .rows_affected();
    if updated == 0 {
        return Err(ApiError::NotFound);
    }

    tracing::info!(user_id = id, expiration = %expiration, "Subscription updated");
    Ok(Json(load_user(&state, id).await?))
}
