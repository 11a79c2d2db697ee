//! Library pruning against a mocked media server

use mockito::{Matcher, Server};
use sqlx::SqlitePool;
use vodum_jobs::libraries::check_libraries;
use vodum_jobs::PlexClient;

use crate::common::*;

async fn library_names(pool: &SqlitePool) -> Vec<String> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM libraries ORDER BY name")
        .fetch_all(pool)
        .await
        .unwrap();
    rows.into_iter().map(|(name,)| name).collect()
}

#[tokio::test]
async fn test_missing_and_orphan_libraries_are_removed() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/library/sections")
        .with_body(r#"<MediaContainer><Directory key="1" title="Movies"/></MediaContainer>"#)
        .create_async()
        .await;
    server
        .mock("GET", "/api/resources")
        .match_query(Matcher::Any)
        .with_status(404)
        .create_async()
        .await;
    for path in ["/users/account", "/api/users", "/api/home/users"] {
        server.mock("GET", path).with_status(404).create_async().await;
    }
    server
        .mock("GET", "/api/servers/abc/shared_servers")
        .with_body("<MediaContainer/>")
        .create_async()
        .await;

    let pool = pool().await;
    insert_server(&pool, "abc", &server.url(), "tok").await;
    let movies = insert_library(&pool, 1, "Movies", "abc").await;
    let shows = insert_library(&pool, 2, "Shows", "abc").await;
    insert_library(&pool, 3, "Old server", "gone").await;
    sqlx::query("INSERT INTO libraries (section_id, name, server_identifier) VALUES (4, 'Nowhere', NULL)")
        .execute(&pool)
        .await
        .unwrap();

    let alice = insert_user(&pool, "2", "alice", None, None).await;
    grant(&pool, alice, shows).await;

    let plex = PlexClient::new(&server.url()).unwrap();
    let summary = check_libraries(&pool, &plex).await.unwrap();

    assert_eq!(summary.removed_missing, 1);
    assert_eq!(summary.removed_orphans, 2);
    assert_eq!(library_names(&pool).await, vec!["Movies".to_string()]);
    assert!(grant_ids(&pool, alice).await.is_empty());

    let (id,): (i64,) = sqlx::query_as("SELECT id FROM libraries WHERE name = 'Movies'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(id, movies);
}

#[tokio::test]
async fn test_unreachable_server_keeps_its_libraries() {
    let pool = pool().await;
    insert_server(&pool, "abc", "http://127.0.0.1:9", "tok").await;
    insert_library(&pool, 1, "Movies", "abc").await;

    let plex = PlexClient::new("http://127.0.0.1:9").unwrap();
    let summary = check_libraries(&pool, &plex).await.unwrap();

    assert_eq!(summary.removed_missing, 0);
    assert_eq!(summary.removed_orphans, 0);
    assert_eq!(library_names(&pool).await, vec!["Movies".to_string()]);
}
