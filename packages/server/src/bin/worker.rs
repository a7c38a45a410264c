// Worker pool entry point: runs N independent task-worker loops against
// the shared queue and result store.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tracklab_core::jobs::events::NatsEventPublisher;
use tracklab_core::jobs::{PostgresJobBackend, TaskContext, TaskWorker, TaskWorkerConfig};
use tracklab_core::tasks::build_registry;
use tracklab_core::Config;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "worker", about = "Tracklab audio task worker pool")]
struct Args {
    /// Number of worker loops to run in this process
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Messages claimed per poll by each worker
    #[arg(long, default_value_t = 1)]
    batch_size: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tracklab_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Tracklab worker pool");

    let config = Config::from_env().context("Failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let nats = async_nats::connect(&config.nats_url)
        .await
        .context("Failed to connect to NATS")?;

    std::fs::create_dir_all(config.storage_dir.join("outputs"))
        .context("Failed to create storage directories")?;

    let registry = Arc::new(build_registry().context("Failed to build task registry")?);
    tracing::info!(kinds = ?registry.kinds(), "Task registry built");

    let backend = Arc::new(PostgresJobBackend::new(pool));
    let events = Arc::new(NatsEventPublisher::new(nats));
    let ctx = Arc::new(TaskContext {
        storage_dir: config.storage_dir.clone(),
    });

    let mut shutdowns = Vec::with_capacity(args.concurrency);
    let mut handles = Vec::with_capacity(args.concurrency);
    for i in 0..args.concurrency {
        let mut worker_config =
            TaskWorkerConfig::with_worker_id(format!("worker-{i}-{}", Uuid::new_v4()));
        worker_config.batch_size = args.batch_size;

        let worker = TaskWorker::with_config(
            backend.clone(),
            backend.clone(),
            registry.clone(),
            ctx.clone(),
            events.clone(),
            worker_config,
        );
        shutdowns.push(worker.shutdown_handle());
        handles.push(tokio::spawn(worker.run()));
    }

    tracing::info!(concurrency = args.concurrency, "Worker pool started");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Received shutdown signal, draining workers");

    for shutdown in &shutdowns {
        shutdown.store(true, Ordering::SeqCst);
    }
    for handle in handles {
        let _ = handle.await;
    }

    tracing::info!("Worker pool stopped");
    Ok(())
}
