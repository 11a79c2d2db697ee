//! Server health checks against a mocked media server and Tautulli

use mockito::{Matcher, Server};
use sqlx::SqlitePool;
use vodum_jobs::servers::check_servers;
use vodum_jobs::{PlexClient, TautulliClient};

use crate::common::*;

async fn add_server(pool: &SqlitePool, name: &str, url: Option<&str>, identifier: Option<&str>) -> i64 {
    sqlx::query(
        "INSERT INTO servers (server_identifier, name, plex_url, plex_token) VALUES (?1, ?2, ?3, 'tok')",
    )
    .bind(identifier)
    .bind(name)
    .bind(url)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

async fn server_row(pool: &SqlitePool, id: i64) -> (Option<String>, String, Option<String>, Option<String>) {
    sqlx::query_as(
        "SELECT server_identifier, name, plex_status, tautulli_status FROM servers WHERE id = ?1",
    )
    .bind(id)
    .fetch_one(pool)
    .await
    .unwrap()
}

#[tokio::test]
async fn test_check_servers_records_each_outcome() {
    let mut server = Server::new_async().await;
    let url = server.url();
    server
        .mock("GET", "/api/resources")
        .match_query(Matcher::Any)
        .with_body(
            r#"<MediaContainer>
                 <Device name="Living Room" clientIdentifier="abc" provides="server"/>
               </MediaContainer>"#,
        )
        .expect(1)
        .create_async()
        .await;
    server
        .mock("GET", "/main/identity")
        .with_body(r#"<MediaContainer machineIdentifier="abc"/>"#)
        .create_async()
        .await;
    server
        .mock("GET", "/denied/identity")
        .with_status(401)
        .create_async()
        .await;
    // Reports the identifier the first server already took
    server
        .mock("GET", "/clone/identity")
        .with_body(r#"<MediaContainer machineIdentifier="abc"/>"#)
        .create_async()
        .await;
    server
        .mock("GET", "/tautulli/api/v2")
        .match_query(Matcher::UrlEncoded("cmd".into(), "status".into()))
        .with_body(r#"{"response":{"result":"success","data":{}}}"#)
        .create_async()
        .await;

    let pool = pool().await;
    let main = add_server(&pool, "Old name", Some(&format!("{}/main", url)), None).await;
    sqlx::query("UPDATE servers SET tautulli_url = ?1, tautulli_api_key = 'k' WHERE id = ?2")
        .bind(format!("{}/tautulli", url))
        .bind(main)
        .execute(&pool)
        .await
        .unwrap();
    let denied = add_server(&pool, "Denied", Some(&format!("{}/denied", url)), Some("def")).await;
    let offline = add_server(&pool, "Offline", Some("http://127.0.0.1:9"), Some("ghi")).await;
    let bare = add_server(&pool, "Bare", None, None).await;
    let clone = add_server(&pool, "Clone", Some(&format!("{}/clone", url)), None).await;

    let plex = PlexClient::new(&url).unwrap();
    let tautulli = TautulliClient::new().unwrap();
    let summary = check_servers(&pool, &plex, &tautulli).await.unwrap();
    assert_eq!(summary.servers.len(), 5);

    let (identifier, name, plex_status, tautulli_status) = server_row(&pool, main).await;
    assert_eq!(identifier.as_deref(), Some("abc"));
    assert_eq!(name, "Living Room");
    assert_eq!(plex_status.as_deref(), Some("ok"));
    assert_eq!(tautulli_status.as_deref(), Some("ok"));

    let (_, name, plex_status, tautulli_status) = server_row(&pool, denied).await;
    assert_eq!(name, "Denied");
    assert_eq!(plex_status.as_deref(), Some("http_401"));
    assert_eq!(tautulli_status.as_deref(), Some("not_configured"));

    assert_eq!(server_row(&pool, offline).await.2.as_deref(), Some("unreachable"));
    assert_eq!(server_row(&pool, bare).await.2.as_deref(), Some("not_configured"));

    let (identifier, name, plex_status, _) = server_row(&pool, clone).await;
    assert_eq!(identifier, None);
    assert_eq!(name, "Clone");
    assert_eq!(plex_status.as_deref(), Some("ok"));
}
