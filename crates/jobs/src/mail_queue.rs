//! Bulk mail campaign queue processor

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use vodum_shared::dates::{now_rfc3339, parse_expiration};
use vodum_shared::event_log::{record_event, LogLevel};
use vodum_shared::{MailCampaign, MailQueueEntry};

use crate::error::JobResult;
use crate::mailer::{MailTransport, OutgoingMail};

/// A campaign still `sending` after this long is closed
const STUCK_AFTER_HOURS: i64 = 6;

/// A campaign `sending` for this long is handed back to the queue
const RESET_AFTER_HOURS: i64 = 2;

/// Finished campaigns are purged after this many days
const PURGE_AFTER_DAYS: i64 = 30;

const CAMPAIGN_COLUMNS: &str =
    "id, subject, html_content, attachment_path, status, created_at, started_at, finished_at";

#[derive(Debug, Clone, Default, Serialize)]
pub struct MailQueueSummary {
    pub closed_stuck: usize,
    pub purged: usize,
    pub reset: usize,
    pub campaign_id: Option<i64>,
    pub sent: usize,
    pub failed: usize,
}

/// Close, purge and reset campaigns left behind by earlier runs
pub async fn recover_campaigns(pool: &SqlitePool, summary: &mut MailQueueSummary) -> JobResult<()> {
    let now = Utc::now();
    let campaigns = sqlx::query_as::<_, MailCampaign>(&format!(
        "SELECT {} FROM mail_campaigns WHERE status IN ('sending', 'finished')",
        CAMPAIGN_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    let age_hours = |at: Option<&str>| -> Option<i64> {
        at.and_then(parse_expiration)
            .map(|t: DateTime<Utc>| (now - t).num_hours())
    };

    for campaign in &campaigns {
        match campaign.status.as_str() {
            "sending" => match age_hours(campaign.started_at.as_deref()) {
                Some(hours) if hours < RESET_AFTER_HOURS => {}
                Some(hours) if hours < STUCK_AFTER_HOURS => {
                    set_campaign_status(pool, campaign.id, "pending").await?;
                    summary.reset += 1;
                    tracing::warn!(campaign_id = campaign.id, "Campaign send interrupted, re-queued");
                }
                _ => {
                    sqlx::query(
                        "UPDATE mail_campaigns SET status = 'finished', finished_at = ?1 WHERE id = ?2",
                    )
                    .bind(now_rfc3339())
                    .bind(campaign.id)
                    .execute(pool)
                    .await?;
                    summary.closed_stuck += 1;
                    tracing::warn!(campaign_id = campaign.id, "Stuck campaign marked finished");
                }
            },
            "finished" => {
                let reference = campaign
                    .finished_at
                    .as_deref()
                    .or(Some(campaign.created_at.as_str()));
                if age_hours(reference).is_some_and(|h| h >= PURGE_AFTER_DAYS * 24) {
                    sqlx::query("DELETE FROM mail_campaigns WHERE id = ?1")
                        .bind(campaign.id)
                        .execute(pool)
                        .await?;
                    summary.purged += 1;
                }
            }
            _ => {}
        }
    }

    Ok(())
}

async fn set_campaign_status(pool: &SqlitePool, id: i64, status: &str) -> JobResult<()> {
    sqlx::query("UPDATE mail_campaigns SET status = ?1 WHERE id = ?2")
        .bind(status)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn next_pending_campaign(pool: &SqlitePool) -> JobResult<Option<MailCampaign>> {
    let campaign = sqlx::query_as::<_, MailCampaign>(&format!(
        "SELECT {} FROM mail_campaigns WHERE status = 'pending' ORDER BY created_at, id LIMIT 1",
        CAMPAIGN_COLUMNS
    ))
    .fetch_optional(pool)
    .await?;
    Ok(campaign)
}

/// Send every pending row of one campaign, then mark it finished
async fn drain_campaign<M>(
    pool: &SqlitePool,
    mailer: &M,
    campaign: &MailCampaign,
    delay: Duration,
    summary: &mut MailQueueSummary,
) -> JobResult<()>
where
    M: MailTransport + ?Sized,
{
    sqlx::query(
        "UPDATE mail_campaigns SET status = 'sending', started_at = COALESCE(started_at, ?1) WHERE id = ?2",
    )
    .bind(now_rfc3339())
    .bind(campaign.id)
    .execute(pool)
    .await?;

    let entries = sqlx::query_as::<_, MailQueueEntry>(
        r#"
        SELECT id, campaign_id, user_id, email, status, error, sent_at
        FROM mail_queue
        WHERE campaign_id = ?1 AND status = 'pending'
        ORDER BY id
        "#,
    )
    .bind(campaign.id)
    .fetch_all(pool)
    .await?;

    let subject = campaign.subject.clone().unwrap_or_default();
    let body = campaign.html_content.clone().unwrap_or_default();

    for (i, entry) in entries.iter().enumerate() {
        let address = entry.email.as_deref().map(str::trim).unwrap_or_default();
        let outcome = if address.is_empty() {
            Err("missing email address".to_string())
        } else {
            let mail = OutgoingMail::html(address, &subject, &body)
                .with_attachment(campaign.attachment_path.as_deref());
            mailer.send(&mail).await.map_err(|e| e.to_string())
        };

        match outcome {
            Ok(()) => {
                sqlx::query("UPDATE mail_queue SET status = 'sent', sent_at = ?1, error = NULL WHERE id = ?2")
                    .bind(now_rfc3339())
                    .bind(entry.id)
                    .execute(pool)
                    .await?;
                summary.sent += 1;
            }
            Err(error) => {
                tracing::warn!(queue_id = entry.id, error = %error, "Campaign mail failed");
                sqlx::query("UPDATE mail_queue SET status = 'error', error = ?1 WHERE id = ?2")
                    .bind(&error)
                    .bind(entry.id)
                    .execute(pool)
                    .await?;
                summary.failed += 1;
            }
        }

        if i + 1 < entries.len() && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    sqlx::query("UPDATE mail_campaigns SET status = 'finished', finished_at = ?1 WHERE id = ?2")
        .bind(now_rfc3339())
        .bind(campaign.id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Recover abandoned campaigns, then drain the oldest pending one.
/// Without a mailer the pending campaign stays queued.
pub async fn send_mail_queue<M>(
    pool: &SqlitePool,
    mailer: Option<&M>,
    delay: Duration,
) -> JobResult<MailQueueSummary>
where
    M: MailTransport + ?Sized,
{
    let mut summary = MailQueueSummary::default();
    recover_campaigns(pool, &mut summary).await?;

    let Some(campaign) = next_pending_campaign(pool).await? else {
        tracing::debug!("No pending mail campaign");
        return Ok(summary);
    };

    let Some(mailer) = mailer else {
        tracing::warn!(campaign_id = campaign.id, "Mail not configured, campaign left pending");
        return Ok(summary);
    };

    summary.campaign_id = Some(campaign.id);
    drain_campaign(pool, mailer, &campaign, delay, &mut summary).await?;

    tracing::info!(
        campaign_id = campaign.id,
        sent = summary.sent,
        failed = summary.failed,
        "Mail campaign finished"
    );
    record_event(
        pool,
        LogLevel::Info,
        &format!(
            "Campaign {} finished: {} sent, {} failed",
            campaign.id, summary.sent, summary.failed
        ),
    )
    .await;

    Ok(summary)
}
