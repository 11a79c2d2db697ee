//! Shared handler state

use std::sync::Arc;

use sqlx::SqlitePool;
use vodum_jobs::JobContext;

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    /// Clients and settings used when a task is run on demand
    pub jobs: JobContext,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(pool: SqlitePool, jobs: JobContext, config: Config) -> Self {
        Self {
            pool,
            jobs,
            config: Arc::new(config),
        }
    }
}
