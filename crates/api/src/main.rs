//! Vodum admin API server

use anyhow::Context;
use tokio::net::TcpListener;
use vodum_api::{build_app, AppState, Config};
use vodum_jobs::{JobContext, JobsConfig};
use vodum_shared::{create_pool, logging::init_tracing, run_migrations};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env().context("loading API configuration")?;
    let jobs_config = JobsConfig {
        database_url: config.database_url.clone(),
        ..JobsConfig::from_env().context("loading job configuration")?
    };

    let pool = create_pool(&config.database_url)
        .await
        .context("opening database")?;
    run_migrations(&pool).await.context("running migrations")?;

    let jobs = JobContext::new(pool.clone(), jobs_config).context("building job clients")?;
    let bind_address = config.bind_address.clone();
    let app = build_app(AppState::new(pool, jobs, config));

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("binding {}", bind_address))?;
    tracing::info!(address = %bind_address, "Vodum API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving API")?;

    tracing::info!("Vodum API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
