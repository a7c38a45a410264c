// Main entry point for the gateway server

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tracklab_core::jobs::events::NatsEventPublisher;
use tracklab_core::jobs::{Gateway, PostgresJobBackend};
use tracklab_core::server::build_app;
use tracklab_core::tasks::build_registry;
use tracklab_core::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tracklab_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Tracklab dispatch gateway");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    // Connect to the event stream
    let nats = async_nats::connect(&config.nats_url)
        .await
        .context("Failed to connect to NATS")?;
    tracing::info!("Event stream connected");

    std::fs::create_dir_all(config.storage_dir.join("outputs"))
        .context("Failed to create storage directories")?;

    // Build the registry and gateway
    let registry = Arc::new(build_registry().context("Failed to build task registry")?);
    tracing::info!(kinds = ?registry.kinds(), "Task registry built");

    let backend = Arc::new(PostgresJobBackend::new(pool.clone()));
    let events = Arc::new(NatsEventPublisher::new(nats.clone()));
    let gateway = Arc::new(Gateway::new(
        registry,
        backend.clone(),
        backend,
        events,
    ));

    let app = build_app(pool, nats, gateway);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
