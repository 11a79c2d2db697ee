use std::time::Duration;

use chrono::Utc;
use vodum_jobs::reminders::{send_reminders, REMINDER_LOCK};
use vodum_shared::locks;

use crate::common::*;

fn date_in(days: i64) -> String {
    (Utc::now().date_naive() + chrono::Duration::days(days))
        .format("%Y-%m-%d")
        .to_string()
}

async fn sent_rows(pool: &sqlx::SqlitePool) -> Vec<(i64, String)> {
    sqlx::query_as("SELECT user_id, type FROM sent_emails ORDER BY user_id, type")
        .fetch_all(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_disabled_setting_sends_nothing() {
    let pool = pool().await;
    insert_user(&pool, "1", "alice", Some("alice@example.com"), Some(&date_in(5))).await;
    let mailer = MemoryMailer::default();

    let summary = send_reminders(&pool, &mailer, Duration::ZERO).await.unwrap();

    assert!(!summary.enabled);
    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn test_sends_every_matching_window_once_per_expiration() {
    let pool = pool().await;
    enable_setting(&pool, "send_reminders").await;
    let alice = insert_user(&pool, "1", "alice", Some("alice@example.com"), Some(&date_in(5))).await;
    let carol = insert_user(&pool, "2", "carol", Some("carol@example.com"), Some(&date_in(20))).await;
    insert_user(&pool, "3", "far", Some("far@example.com"), Some(&date_in(90))).await;
    insert_user(&pool, "4", "nomail", None, Some(&date_in(5))).await;

    let mailer = MemoryMailer::default();
    let summary = send_reminders(&pool, &mailer, Duration::ZERO).await.unwrap();

    assert!(summary.enabled);
    assert_eq!(summary.eligible_users, 3);
    assert_eq!(summary.sent, 3);
    assert_eq!(
        sent_rows(&pool).await,
        vec![
            (alice, "preavis".to_string()),
            (alice, "relance".to_string()),
            (carol, "preavis".to_string()),
        ]
    );

    let mails = mailer.sent();
    assert!(mails
        .iter()
        .any(|m| m.to == "alice@example.com" && m.subject == "Reminder: 5 days left"));

    let again = send_reminders(&pool, &mailer, Duration::ZERO).await.unwrap();
    assert_eq!(again.sent, 0);
    assert_eq!(again.already_sent, 3);
    assert_eq!(mailer.sent().len(), 3);
}

#[tokio::test]
async fn test_new_expiration_date_reopens_the_window() {
    let pool = pool().await;
    enable_setting(&pool, "send_reminders").await;
    let alice = insert_user(&pool, "1", "alice", Some("alice@example.com"), Some(&date_in(20))).await;
    let mailer = MemoryMailer::default();

    send_reminders(&pool, &mailer, Duration::ZERO).await.unwrap();
    sqlx::query("UPDATE users SET expiration_date = ?1 WHERE id = ?2")
        .bind(date_in(21))
        .bind(alice)
        .execute(&pool)
        .await
        .unwrap();
    let summary = send_reminders(&pool, &mailer, Duration::ZERO).await.unwrap();

    assert_eq!(summary.sent, 1);
    assert_eq!(mailer.sent().len(), 2);
}

#[tokio::test]
async fn test_failed_delivery_is_not_recorded() {
    let pool = pool().await;
    enable_setting(&pool, "send_reminders").await;
    insert_user(&pool, "1", "alice", Some("alice@example.com"), Some(&date_in(20))).await;

    let failing = MemoryMailer::rejecting("alice@example.com");
    let summary = send_reminders(&pool, &failing, Duration::ZERO).await.unwrap();
    assert_eq!(summary.failed, 1);
    assert!(sent_rows(&pool).await.is_empty());

    let working = MemoryMailer::default();
    let retry = send_reminders(&pool, &working, Duration::ZERO).await.unwrap();
    assert_eq!(retry.sent, 1);
}

#[tokio::test]
async fn test_held_lock_skips_the_run() {
    let pool = pool().await;
    enable_setting(&pool, "send_reminders").await;
    insert_user(&pool, "1", "alice", Some("alice@example.com"), Some(&date_in(5))).await;
    assert!(locks::try_acquire(&pool, REMINDER_LOCK, chrono::Duration::hours(6))
        .await
        .unwrap());

    let mailer = MemoryMailer::default();
    let summary = send_reminders(&pool, &mailer, Duration::ZERO).await.unwrap();

    assert!(summary.locked_out);
    assert!(mailer.sent().is_empty());

    locks::release(&pool, REMINDER_LOCK).await.unwrap();
    let summary = send_reminders(&pool, &mailer, Duration::ZERO).await.unwrap();
    assert!(!summary.locked_out);
    assert_eq!(summary.sent, 2);
}
