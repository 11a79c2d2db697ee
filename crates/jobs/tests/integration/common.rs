//! Shared fixtures

use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::SqlitePool;
use vodum_jobs::{MailError, MailTransport, OutgoingMail};
use vodum_shared::{create_memory_pool, run_migrations};

pub async fn pool() -> SqlitePool {
    let pool = create_memory_pool().await.expect("memory pool");
    run_migrations(&pool).await.expect("migrations");
    pool
}

/// Records every message; fails for addresses listed in `reject`
#[derive(Default)]
pub struct MemoryMailer {
    pub sent: Mutex<Vec<OutgoingMail>>,
    pub reject: Vec<String>,
}

impl MemoryMailer {
    pub fn rejecting(address: &str) -> Self {
        Self {
            reject: vec![address.to_string()],
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for MemoryMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        if self.reject.contains(&mail.to) {
            return Err(MailError::Smtp(format!("550 mailbox {} unavailable", mail.to)));
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

pub async fn insert_user(
    pool: &SqlitePool,
    plex_id: &str,
    username: &str,
    email: Option<&str>,
    expiration: Option<&str>,
) -> i64 {
    sqlx::query(
        "INSERT INTO users (plex_id, username, email, expiration_date) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(plex_id)
    .bind(username)
    .bind(email)
    .bind(expiration)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

pub async fn insert_server(pool: &SqlitePool, identifier: &str, url: &str, token: &str) -> i64 {
    sqlx::query(
        "INSERT INTO servers (server_identifier, name, plex_url, plex_token, plex_status) VALUES (?1, ?2, ?3, ?4, 'ok')",
    )
    .bind(identifier)
    .bind(format!("Server {}", identifier))
    .bind(url)
    .bind(token)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

pub async fn insert_library(pool: &SqlitePool, section_id: i64, name: &str, server: &str) -> i64 {
    sqlx::query("INSERT INTO libraries (section_id, name, server_identifier) VALUES (?1, ?2, ?3)")
        .bind(section_id)
        .bind(name)
        .bind(server)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}

pub async fn grant(pool: &SqlitePool, user_id: i64, library_id: i64) {
    sqlx::query("INSERT INTO user_libraries (user_id, library_id) VALUES (?1, ?2)")
        .bind(user_id)
        .bind(library_id)
        .execute(pool)
        .await
        .unwrap();
}

pub async fn user_status(pool: &SqlitePool, user_id: i64) -> (Option<String>, Option<String>) {
    sqlx::query_as("SELECT status, last_status FROM users WHERE id = ?1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn grant_ids(pool: &SqlitePool, user_id: i64) -> Vec<i64> {
    let rows: Vec<(i64,)> =
        sqlx::query_as("SELECT library_id FROM user_libraries WHERE user_id = ?1 ORDER BY library_id")
            .bind(user_id)
            .fetch_all(pool)
            .await
            .unwrap();
    rows.into_iter().map(|(id,)| id).collect()
}

pub async fn enable_setting(pool: &SqlitePool, column: &str) {
    sqlx::query(&format!("UPDATE settings SET {} = 1 WHERE id = 1", column))
        .execute(pool)
        .await
        .unwrap();
}
