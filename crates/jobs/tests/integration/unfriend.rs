//! Unfriending long-expired users

use chrono::{Duration, Utc};
use mockito::Server;
use sqlx::SqlitePool;
use vodum_jobs::unfriend::delete_expired_users;
use vodum_jobs::PlexClient;

use crate::common::*;

async fn expired_user(pool: &SqlitePool, plex_id: &str, username: &str, expiration: &str) -> i64 {
    let id = insert_user(pool, plex_id, username, None, Some(expiration)).await;
    sqlx::query("UPDATE users SET status = 'expired', library_access = '1' WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
    id
}

async fn grant_counts(pool: &SqlitePool, user_id: i64) -> (i64, i64, i64) {
    sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM user_libraries WHERE user_id = ?1),
            (SELECT COUNT(*) FROM shared_libraries WHERE user_id = ?1),
            (SELECT COUNT(*) FROM user_servers WHERE user_id = ?1)
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn library_access(pool: &SqlitePool, user_id: i64) -> Option<String> {
    let (value,): (Option<String>,) = sqlx::query_as("SELECT library_access FROM users WHERE id = ?1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .unwrap();
    value
}

#[tokio::test]
async fn test_disabled_when_no_delay_is_set() {
    let pool = pool().await;
    let alice = expired_user(&pool, "2", "alice", "2020-01-01").await;

    let plex = PlexClient::new("http://127.0.0.1:9").unwrap();
    let summary = delete_expired_users(&pool, &plex).await.unwrap();

    assert!(!summary.enabled);
    assert_eq!(user_status(&pool, alice).await.0.as_deref(), Some("expired"));
}

#[tokio::test]
async fn test_due_users_are_unfriended_and_cleaned_even_when_plex_fails() {
    let mut server = Server::new_async().await;
    let removed = server
        .mock("DELETE", "/api/v2/friends/2")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let rejected = server
        .mock("DELETE", "/api/v2/friends/3")
        .with_status(404)
        .expect(1)
        .create_async()
        .await;

    let pool = pool().await;
    sqlx::query("UPDATE settings SET delete_after_expiry_days = 30 WHERE id = 1")
        .execute(&pool)
        .await
        .unwrap();
    let server_id = insert_server(&pool, "abc", &server.url(), "tok").await;
    let movies = insert_library(&pool, 1, "Movies", "abc").await;

    let alice = expired_user(&pool, "2", "alice", "2020-01-01").await;
    grant(&pool, alice, movies).await;
    sqlx::query("INSERT INTO shared_libraries (user_id, library_id) VALUES (?1, ?2)")
        .bind(alice)
        .bind(movies)
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO user_servers (user_id, server_id) VALUES (?1, ?2)")
        .bind(alice)
        .bind(server_id)
        .execute(&pool)
        .await
        .unwrap();

    let bob = expired_user(&pool, "3", "bob", "2020-01-01").await;
    grant(&pool, bob, movies).await;

    let recent = (Utc::now() - Duration::days(2)).format("%Y-%m-%d").to_string();
    let carol = expired_user(&pool, "4", "carol", &recent).await;
    grant(&pool, carol, movies).await;

    let plex = PlexClient::new(&server.url()).unwrap();
    let summary = delete_expired_users(&pool, &plex).await.unwrap();

    assert!(summary.enabled);
    assert_eq!(summary.candidates, 2);
    assert_eq!(summary.unfriended, 2);
    assert_eq!(summary.remote_failures, 1);

    for user in [alice, bob] {
        assert_eq!(grant_counts(&pool, user).await, (0, 0, 0));
        assert_eq!(library_access(&pool, user).await, None);
        let (status, last) = user_status(&pool, user).await;
        assert_eq!(status.as_deref(), Some("unfriended"));
        assert_eq!(last.as_deref(), Some("expired"));
    }

    assert_eq!(grant_ids(&pool, carol).await, vec![movies]);
    assert_eq!(library_access(&pool, carol).await.as_deref(), Some("1"));
    assert_eq!(user_status(&pool, carol).await.0.as_deref(), Some("expired"));

    removed.assert_async().await;
    rejected.assert_async().await;
}
