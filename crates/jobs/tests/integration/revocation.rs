use mockito::{Matcher, Server};
use vodum_jobs::revocation::disable_expired_users;
use vodum_jobs::PlexClient;

use crate::common::*;

const SHARES: &str = r#"<MediaContainer>
  <SharedServer id="900" userID="2" machineIdentifier="abc">
    <Section id="11" key="1" title="Movies" shared="1"/>
  </SharedServer>
</MediaContainer>"#;

#[tokio::test]
async fn test_disabled_setting_leaves_grants() {
    let pool = pool().await;
    insert_server(&pool, "abc", "http://127.0.0.1:9", "tok").await;
    let movies = insert_library(&pool, 1, "Movies", "abc").await;
    let alice = insert_user(&pool, "2", "alice", None, Some("2020-01-01")).await;
    grant(&pool, alice, movies).await;

    let plex = PlexClient::new("http://127.0.0.1:9").unwrap();
    let summary = disable_expired_users(&pool, &plex).await.unwrap();

    assert!(!summary.enabled);
    assert_eq!(grant_ids(&pool, alice).await, vec![movies]);
}

#[tokio::test]
async fn test_expired_user_share_is_emptied_and_grants_removed() {
    let mut server = Server::new_async().await;
    let listing = server
        .mock("GET", "/api/servers/abc/shared_servers")
        .with_body(SHARES)
        .expect(1)
        .create_async()
        .await;
    let revoke = server
        .mock("POST", "/api/v2/shared_servers/900")
        .match_body(Matcher::Json(serde_json::json!({
            "machineIdentifier": "abc",
            "librarySectionIds": [],
        })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let pool = pool().await;
    enable_setting(&pool, "disable_on_expiry").await;
    insert_server(&pool, "abc", &server.url(), "tok").await;
    let movies = insert_library(&pool, 1, "Movies", "abc").await;

    let alice = insert_user(&pool, "2", "alice", None, Some("2020-01-01")).await;
    grant(&pool, alice, movies).await;
    // No share left on Plex for bob: only the local grant goes
    let bob = insert_user(&pool, "3", "bob", None, Some("2020-01-01")).await;
    grant(&pool, bob, movies).await;
    let current = insert_user(&pool, "4", "carol", None, Some("2999-01-01")).await;
    grant(&pool, current, movies).await;

    let plex = PlexClient::new(&server.url()).unwrap();
    let summary = disable_expired_users(&pool, &plex).await.unwrap();

    assert!(summary.enabled);
    assert_eq!(summary.candidates, 2);
    assert_eq!(summary.servers_revoked, 2);
    assert_eq!(summary.failures, 0);
    assert!(grant_ids(&pool, alice).await.is_empty());
    assert!(grant_ids(&pool, bob).await.is_empty());
    assert_eq!(grant_ids(&pool, current).await, vec![movies]);

    listing.assert_async().await;
    revoke.assert_async().await;
}

#[tokio::test]
async fn test_failed_revocation_keeps_local_grant() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/servers/abc/shared_servers")
        .with_body(SHARES)
        .create_async()
        .await;
    server
        .mock("POST", "/api/v2/shared_servers/900")
        .with_status(403)
        .create_async()
        .await;

    let pool = pool().await;
    enable_setting(&pool, "disable_on_expiry").await;
    insert_server(&pool, "abc", &server.url(), "tok").await;
    let movies = insert_library(&pool, 1, "Movies", "abc").await;
    let alice = insert_user(&pool, "2", "alice", None, None).await;
    grant(&pool, alice, movies).await;
    sqlx::query("UPDATE users SET status = 'suspended' WHERE id = ?1")
        .bind(alice)
        .execute(&pool)
        .await
        .unwrap();

    let plex = PlexClient::new(&server.url()).unwrap();
    let summary = disable_expired_users(&pool, &plex).await.unwrap();

    assert_eq!(summary.candidates, 1);
    assert_eq!(summary.failures, 1);
    assert_eq!(grant_ids(&pool, alice).await, vec![movies]);
}
