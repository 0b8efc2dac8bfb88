use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fikra::analytics::Aggregator;
use fikra::api::create_api_router;
use fikra::clock::SystemClock;
use fikra::config::Config;
use fikra::storage;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Initialize storage
    let store = storage::connect(&config.database).await?;

    info!("Initializing database...");
    store.init().await.context("failed to initialize the event store")?;
    info!("Database initialized successfully");

    let aggregation = config.aggregation.clone();
    info!(
        "Aggregation settings: active window {:?}, rank limit {}, entries limit {}, call deadline {:?}",
        aggregation.active_window, aggregation.rank_limit, aggregation.entries_limit, aggregation.ttl
    );
    let aggregator = Arc::new(Aggregator::new(store, Arc::new(SystemClock), aggregation));

    let shutdown = CancellationToken::new();
    let router = create_api_router(aggregator, &config.cors, shutdown.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 API server listening on http://{}", addr);
    info!("   - Aggregates available at http://{}/api/domains/{{domain_id}}/...", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received, canceling in-flight aggregations...");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
