//! Status derivation over a real schema

use chrono::{Duration, Utc};
use mockito::Server;
use vodum_jobs::status::update_user_status;
use vodum_jobs::PlexClient;

use crate::common::*;

fn date_in(days: i64) -> String {
    (Utc::now() + Duration::days(days)).format("%Y-%m-%d").to_string()
}

#[tokio::test]
async fn test_statuses_follow_expiration_and_second_run_writes_nothing() {
    let pool = pool().await;
    insert_server(&pool, "abc", "http://127.0.0.1:9", "tok").await;
    let library = insert_library(&pool, 1, "Movies", "abc").await;

    let active = insert_user(&pool, "1", "active", None, Some(&date_in(60))).await;
    let soon = insert_user(&pool, "2", "soon", None, Some(&date_in(3))).await;
    let lapsed = insert_user(&pool, "3", "lapsed", None, Some(&date_in(-10))).await;
    for user in [active, soon, lapsed] {
        grant(&pool, user, library).await;
    }

    // The friends call fails, so nobody's friend state is known
    let plex = PlexClient::new("http://127.0.0.1:9").unwrap();
    let summary = update_user_status(&pool, &plex).await.unwrap();
    assert_eq!(summary.checked, 3);
    assert_eq!(summary.changed, 3);

    assert_eq!(user_status(&pool, active).await.0.as_deref(), Some("active"));
    assert_eq!(user_status(&pool, soon).await.0.as_deref(), Some("reminder"));
    assert_eq!(user_status(&pool, lapsed).await.0.as_deref(), Some("expired"));

    let again = update_user_status(&pool, &plex).await.unwrap();
    assert_eq!(again.changed, 0);
}

#[tokio::test]
async fn test_last_status_keeps_previous_value_and_suspended_sticks() {
    let pool = pool().await;
    let library = insert_library(&pool, 1, "Movies", "abc").await;

    let user = insert_user(&pool, "1", "alice", None, Some(&date_in(-10))).await;
    grant(&pool, user, library).await;
    sqlx::query("UPDATE users SET status = 'active' WHERE id = ?1")
        .bind(user)
        .execute(&pool)
        .await
        .unwrap();

    let suspended = insert_user(&pool, "2", "bob", None, Some(&date_in(-10))).await;
    sqlx::query("UPDATE users SET status = 'suspended' WHERE id = ?1")
        .bind(suspended)
        .execute(&pool)
        .await
        .unwrap();

    let plex = PlexClient::new("http://127.0.0.1:9").unwrap();
    update_user_status(&pool, &plex).await.unwrap();

    let (status, last) = user_status(&pool, user).await;
    assert_eq!(status.as_deref(), Some("expired"));
    assert_eq!(last.as_deref(), Some("active"));

    let (status, last) = user_status(&pool, suspended).await;
    assert_eq!(status.as_deref(), Some("suspended"));
    assert_eq!(last, None);
}

#[tokio::test]
async fn test_friend_list_decides_users_without_access() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/pms/friends/all")
        .with_body(r#"<MediaContainer><User id="5" username="friend"/></MediaContainer>"#)
        .create_async()
        .await;

    let pool = pool().await;
    insert_server(&pool, "abc", &server.url(), "tok").await;
    let friend = insert_user(&pool, "5", "friend", None, None).await;
    let stranger = insert_user(&pool, "6", "stranger", None, None).await;
    let guest = insert_user(&pool, "7", "Guest", None, None).await;

    let plex = PlexClient::new(&server.url()).unwrap();
    update_user_status(&pool, &plex).await.unwrap();

    assert_eq!(user_status(&pool, friend).await.0.as_deref(), Some("expired"));
    assert_eq!(user_status(&pool, stranger).await.0.as_deref(), Some("unfriended"));
    assert_eq!(user_status(&pool, guest).await.0.as_deref(), Some("unknown"));
}

#[tokio::test]
async fn test_blank_friends_body_falls_back_to_api_friends() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/pms/friends/all")
        .with_body("")
        .create_async()
        .await;
    let fallback = server
        .mock("GET", "/api/friends")
        .with_body(r#"<MediaContainer><User id="5" username="friend"/></MediaContainer>"#)
        .expect(1)
        .create_async()
        .await;

    let pool = pool().await;
    insert_server(&pool, "abc", &server.url(), "tok").await;
    let friend = insert_user(&pool, "5", "friend", None, None).await;

    let plex = PlexClient::new(&server.url()).unwrap();
    update_user_status(&pool, &plex).await.unwrap();

    assert_eq!(user_status(&pool, friend).await.0.as_deref(), Some("expired"));
    fallback.assert_async().await;
}

#[tokio::test]
async fn test_blank_friends_everywhere_leaves_friend_state_unknown() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/pms/friends/all")
        .with_body("  ")
        .create_async()
        .await;
    server
        .mock("GET", "/api/friends")
        .with_body("")
        .create_async()
        .await;

    let pool = pool().await;
    insert_server(&pool, "abc", &server.url(), "tok").await;
    let user = insert_user(&pool, "5", "alice", None, None).await;

    let plex = PlexClient::new(&server.url()).unwrap();
    update_user_status(&pool, &plex).await.unwrap();

    assert_eq!(user_status(&pool, user).await.0.as_deref(), Some("unknown"));
}

#[tokio::test]
async fn test_legacy_access_field_counts_even_when_not_numeric() {
    let pool = pool().await;
    let user = insert_user(&pool, "1", "alice", None, Some(&date_in(60))).await;
    sqlx::query("UPDATE users SET library_access = 'abc' WHERE id = ?1")
        .bind(user)
        .execute(&pool)
        .await
        .unwrap();

    let plex = PlexClient::new("http://127.0.0.1:9").unwrap();
    update_user_status(&pool, &plex).await.unwrap();

    assert_eq!(user_status(&pool, user).await.0.as_deref(), Some("active"));
}
