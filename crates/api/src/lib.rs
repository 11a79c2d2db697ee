//! Vodum API Library
//!
//! Admin HTTP API over the Vodum database: users, servers, tasks and mail
//! campaigns.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Router with tracing and CORS layers applied
pub fn build_app(state: AppState) -> Router {
    routes::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
