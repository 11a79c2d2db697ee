//! API routes

pub mod campaigns;
pub mod health;
pub mod servers;
pub mod tasks;
pub mod users;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};

use crate::{auth::require_admin, state::AppState};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    let admin_routes = Router::new()
        .route("/users", get(users::list_users))
        .route("/users/:id", get(users::get_user))
        .route("/users/:id/suspend", post(users::suspend_user))
        .route("/users/:id/unsuspend", post(users::unsuspend_user))
        .route("/users/:id/subscription", post(users::set_subscription))
        .route("/servers", get(servers::list_servers))
        .route("/activity", get(servers::activity))
        .route("/tasks", get(tasks::list_tasks))
        .route("/tasks/:name/run", post(tasks::run))
        .route(
            "/campaigns",
            get(campaigns::list_campaigns).post(campaigns::create_campaign),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", admin_routes)
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
        .with_state(state)
}
