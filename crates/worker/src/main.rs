//! Background worker: runs the audit outbox drain against Postgres until
//! SIGINT or SIGTERM.

mod config;

use std::sync::Arc;

use anyhow::Context;
use atelier_db::PgStore;
use atelier_engine::OutboxDrain;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    // --- Configuration ---
    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;
    tracing::info!(
        max_connections = config.max_connections,
        poll_interval_ms = config.outbox.poll_interval.as_millis() as u64,
        batch_size = config.outbox.batch_size,
        "Loaded worker configuration",
    );

    // --- Database ---
    let pool = atelier_db::create_pool(&config.database_url, config.max_connections)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    atelier_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    tracing::info!("Database health check passed");

    atelier_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    // --- Outbox drain ---
    let drain = OutboxDrain::new(Arc::new(PgStore::new(pool.clone())), config.outbox.clone());
    let handle = drain.start();

    shutdown_signal().await?;

    if tokio::time::timeout(config.shutdown_timeout, handle.shutdown())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = config.shutdown_timeout.as_secs(),
            "Audit outbox drain did not stop in time",
        );
    }
    pool.close().await;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Human-readable logs by default, JSON lines when `LOG_FORMAT=json`.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "atelier_worker=debug,atelier_engine=debug".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to install Ctrl-C handler")?;
                tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
            }
            _ = terminate.recv() => {
                tracing::info!("Received SIGTERM, starting graceful shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to install Ctrl-C handler")?;
        tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
    }

    Ok(())
}
