//! Mail campaign routes

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub subject: String,
    pub html_content: String,
    pub attachment_path: Option<String>,
    /// Explicit addresses; every user with an email when omitted
    pub recipients: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct CreateCampaignResponse {
    pub id: i64,
    pub queued: u64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct CampaignSummary {
    pub id: i64,
    pub subject: Option<String>,
    pub status: String,
    pub created_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub pending: i64,
    pub sent: i64,
    pub failed: i64,
}

pub async fn list_campaigns(State(state): State<AppState>) -> ApiResult<Json<Vec<CampaignSummary>>> {
    let campaigns = sqlx::query_as::<_, CampaignSummary>(
        r#"
        SELECT c.id, c.subject, c.status, c.created_at, c.started_at, c.finished_at,
               COALESCE(SUM(q.status = 'pending'), 0) AS pending,
               COALESCE(SUM(q.status = 'sent'), 0) AS sent,
               COALESCE(SUM(q.status = 'error'), 0) AS failed
        FROM mail_campaigns c
        LEFT JOIN mail_queue q ON q.campaign_id = c.id
        GROUP BY c.id
        ORDER BY c.created_at DESC, c.id DESC
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(campaigns))
}

/// Create a pending campaign and queue its recipients
pub async fn create_campaign(
    State(state): State<AppState>,
    Json(body): Json<CreateCampaignRequest>,
) -> ApiResult<(StatusCode, Json<CreateCampaignResponse>)> {
    let subject = body.subject.trim();
    if subject.is_empty() {
        return Err(ApiError::Validation("subject is required".to_string()));
    }
    if body.html_content.trim().is_empty() {
        return Err(ApiError::Validation("html_content is required".to_string()));
    }
    let attachment = body
        .attachment_path
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());

    let mut tx = state.pool.begin().await?;

    let id = sqlx::query(
        "INSERT INTO mail_campaigns (subject, html_content, attachment_path, status) VALUES (?1, ?2, ?3, 'pending')",
    )
    .bind(subject)
    .bind(&body.html_content)
    .bind(attachment)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    let mut queued = 0;
    match &body.recipients {
        Some(recipients) => {
            let mut seen: Vec<String> = Vec::new();
            for address in recipients.iter().map(|r| r.trim()).filter(|r| !r.is_empty()) {
                if seen.iter().any(|s| s.eq_ignore_ascii_case(address)) {
                    continue;
                }
                seen.push(address.to_string());

                queued += sqlx::query(
                    r#"
                    INSERT INTO mail_queue (campaign_id, user_id, email)
                    VALUES (?1, (SELECT id FROM users WHERE LOWER(email) = LOWER(?2) LIMIT 1), ?2)
                    "#,
                )
                .bind(id)
                .bind(address)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            }
        }
        None => {
            queued = sqlx::query(
                r#"
                INSERT INTO mail_queue (campaign_id, user_id, email)
                SELECT ?1, id, TRIM(email) FROM users
                WHERE email IS NOT NULL AND TRIM(email) != ''
                ORDER BY id
                "#,
            )
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
    }

    if queued == 0 {
        return Err(ApiError::Validation("Campaign has no recipients".to_string()));
    }

    tx.commit().await?;
    tracing::info!(campaign_id = id, queued, "Mail campaign queued");

    Ok((StatusCode::CREATED, Json(CreateCampaignResponse { id, queued })))
}
