//! Plex synchronization against a mocked Plex.tv and media server

use chrono::{Duration, Utc};
use mockito::{Matcher, Server, ServerGuard};
use vodum_jobs::sync::{sync_user_libraries, sync_users};
use vodum_jobs::PlexClient;

use crate::common::*;

async fn mock_plex(server: &mut ServerGuard) {
    let url = server.url();
    server
        .mock("GET", "/api/resources")
        .match_query(Matcher::Any)
        .with_body(format!(
            r#"<MediaContainer>
                 <Device name="Main" clientIdentifier="abc" provides="server" accessToken="tok">
                   <Connection uri="{}" local="1"/>
                 </Device>
               </MediaContainer>"#,
            url
        ))
        .create_async()
        .await;
    server
        .mock("GET", "/users/account")
        .with_body(r#"<user id="1" username="owner" email="owner@example.com"/>"#)
        .create_async()
        .await;
    server
        .mock("GET", "/api/users")
        .with_body(
            r#"<MediaContainer>
                 <User id="2" username="alice" email="alice@example.com" thumb="https://plex.tv/a.png"/>
                 <User id="3" title="bob"/>
                 <User id="4"/>
               </MediaContainer>"#,
        )
        .create_async()
        .await;
    server
        .mock("GET", "/api/home/users")
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("GET", "/library/sections")
        .with_body(
            r#"<MediaContainer>
                 <Directory key="1" title="Movies"/>
                 <Directory key="2" title="Shows"/>
               </MediaContainer>"#,
        )
        .create_async()
        .await;
    server
        .mock("GET", "/api/servers/abc/shared_servers")
        .with_body(
            r#"<MediaContainer>
                 <SharedServer id="900" userID="2" machineIdentifier="abc">
                   <Section id="11" key="1" title="Movies" shared="1"/>
                   <Section id="12" key="2" title="Shows" shared="0"/>
                 </SharedServer>
                 <SharedServer id="901" userID="3" machineIdentifier="abc">
                   <Section id="12" key="2" title="Shows" shared="1"/>
                 </SharedServer>
               </MediaContainer>"#,
        )
        .create_async()
        .await;
}

async fn user_id(pool: &sqlx::SqlitePool, plex_id: &str) -> i64 {
    let (id,): (i64,) = sqlx::query_as("SELECT id FROM users WHERE plex_id = ?1")
        .bind(plex_id)
        .fetch_one(pool)
        .await
        .unwrap();
    id
}

async fn library_id(pool: &sqlx::SqlitePool, name: &str) -> i64 {
    let (id,): (i64,) = sqlx::query_as("SELECT id FROM libraries WHERE name = ?1")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap();
    id
}

#[tokio::test]
async fn test_first_sync_creates_users_libraries_and_grants() {
    let mut server = Server::new_async().await;
    mock_plex(&mut server).await;
    let pool = pool().await;
    insert_server(&pool, "abc", &server.url(), "tok").await;

    let plex = PlexClient::new(&server.url()).unwrap();
    let summary = sync_users(&pool, &plex).await.unwrap();

    assert_eq!(summary.users_created, 3);
    assert_eq!(summary.users_skipped, 1);
    assert_eq!(summary.grants_added, 2);

    let (is_admin, expiration): (bool, String) =
        sqlx::query_as("SELECT is_admin, expiration_date FROM users WHERE plex_id = '1'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(is_admin);
    let trial_end = (Utc::now() + Duration::days(30)).format("%Y-%m-%d").to_string();
    assert_eq!(expiration, trial_end);

    let alice = user_id(&pool, "2").await;
    let bob = user_id(&pool, "3").await;
    assert_eq!(grant_ids(&pool, alice).await, vec![library_id(&pool, "Movies").await]);
    assert_eq!(grant_ids(&pool, bob).await, vec![library_id(&pool, "Shows").await]);

    let (access,): (Option<String>,) =
        sqlx::query_as("SELECT library_access FROM users WHERE id = ?1")
            .bind(bob)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(access.as_deref(), Some("2"));

    let (links,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_servers")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(links, 2);

    let (name,): (String,) = sqlx::query_as("SELECT name FROM servers WHERE server_identifier = 'abc'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(name, "Main");
}

#[tokio::test]
async fn test_second_sync_is_a_no_op() {
    let mut server = Server::new_async().await;
    mock_plex(&mut server).await;
    let pool = pool().await;
    insert_server(&pool, "abc", &server.url(), "tok").await;
    let plex = PlexClient::new(&server.url()).unwrap();

    sync_users(&pool, &plex).await.unwrap();
    let again = sync_users(&pool, &plex).await.unwrap();

    assert_eq!(again.users_created, 0);
    assert_eq!(again.users_updated, 0);
    assert_eq!(again.grants_added, 0);
    assert_eq!(again.grants_removed, 0);
    assert_eq!(again.user_servers_rebuilt, 0);
}

#[tokio::test]
async fn test_stale_grants_are_removed_and_expiration_kept() {
    let mut server = Server::new_async().await;
    mock_plex(&mut server).await;
    let pool = pool().await;
    insert_server(&pool, "abc", &server.url(), "tok").await;

    let bob = insert_user(&pool, "3", "bob", None, Some("2031-01-01")).await;
    let movies = insert_library(&pool, 1, "Movies", "abc").await;
    grant(&pool, bob, movies).await;

    let plex = PlexClient::new(&server.url()).unwrap();
    let summary = sync_user_libraries(&pool, &plex).await.unwrap();
    assert_eq!(summary.grants_removed, 1);
    assert_eq!(summary.grants_added, 1);

    let shows = library_id(&pool, "Shows").await;
    assert_eq!(grant_ids(&pool, bob).await, vec![shows]);

    sync_users(&pool, &plex).await.unwrap();
    let (expiration,): (String,) = sqlx::query_as("SELECT expiration_date FROM users WHERE id = ?1")
        .bind(bob)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(expiration, "2031-01-01");
}

#[tokio::test]
async fn test_unreachable_shares_leave_grants_untouched() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/library/sections")
        .with_body(r#"<MediaContainer><Directory key="1" title="Movies"/></MediaContainer>"#)
        .create_async()
        .await;
    server
        .mock("GET", "/api/servers/abc/shared_servers")
        .with_status(403)
        .create_async()
        .await;

    let pool = pool().await;
    insert_server(&pool, "abc", &server.url(), "tok").await;
    let alice = insert_user(&pool, "2", "alice", None, None).await;
    let movies = insert_library(&pool, 1, "Movies", "abc").await;
    grant(&pool, alice, movies).await;

    let plex = PlexClient::new(&server.url()).unwrap();
    let summary = sync_user_libraries(&pool, &plex).await.unwrap();

    assert_eq!(summary.grants_removed, 0);
    assert_eq!(grant_ids(&pool, alice).await, vec![movies]);
}
