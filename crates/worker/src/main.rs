//! Vodum worker
//!
//! Runs the scheduled jobs, or a single task on demand.

mod scheduler;

use anyhow::Context;
use clap::{Parser, Subcommand};
use vodum_jobs::{run_task, JobContext, JobsConfig};
use vodum_shared::{create_pool, logging::init_tracing, run_migrations, TaskKind};

/// Background jobs for the Vodum panel
#[derive(Parser)]
#[command(name = "vodum-worker", about = "Scheduled jobs for the Vodum panel")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one task now and exit
    Run {
        /// Task name, as printed by `list`
        task: String,
    },
    /// Print the task registry
    List,
}

async fn context() -> anyhow::Result<JobContext> {
    let config = JobsConfig::from_env().context("loading job configuration")?;
    let pool = create_pool(&config.database_url)
        .await
        .context("opening database")?;
    run_migrations(&pool).await.context("running migrations")?;
    JobContext::new(pool, config).context("building job clients")
}

fn print_registry() {
    for task in TaskKind::ALL {
        let interval = if task.is_scheduled() {
            format!("every {} min", task.interval_minutes())
        } else {
            "manual".to_string()
        };
        println!("{:<24} {:<16} {}", task.name(), interval, task.label());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::List) => {
            print_registry();
            Ok(())
        }
        Some(Commands::Run { task }) => {
            let task: TaskKind = task.parse().map_err(anyhow::Error::msg)?;
            let ctx = context().await?;
            let summary = run_task(&ctx, task)
                .await
                .with_context(|| format!("task {} failed", task.name()))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        None => {
            let ctx = context().await?;
            let mut scheduler = scheduler::start(ctx).await?;
            tracing::info!("Vodum worker started");

            tokio::signal::ctrl_c()
                .await
                .context("listening for shutdown signal")?;
            tracing::info!("Shutting down worker");
            scheduler.shutdown().await?;
            Ok(())
        }
    }
}
