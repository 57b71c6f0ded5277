//! Attribute Cache - A replicated attribute-value cache server
//!
//! Serves attribute lookups from memory and keeps replicas converged through
//! a publish/subscribe change channel.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use attribute_cache::api::{create_router, AppState};
use attribute_cache::broker::{Broker, InMemoryBroker};
use attribute_cache::cache::CacheStore;
use attribute_cache::seed::{JsonFileSeed, SeedSource, StaticSeed};
use attribute_cache::{spawn_cleanup_task, spawn_refresh_task, CacheService, Config};

/// Main entry point for the attribute cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache store, broker and cache service
/// 4. Subscribe, start the change ingestor and load the seed
/// 5. Start the reclamation and refresh background tasks
/// 6. Serve HTTP until SIGINT/SIGTERM, then stop every background task
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "attribute_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting attribute cache server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: port={}, sliding_expiration={}s, topic={}, queue={}, refresh={:?}",
        config.server_port,
        config.sliding_expiration,
        config.change_topic,
        config.instance_queue,
        config.refresh_schedule()
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let store = CacheStore::shared(config.sliding_window());
    let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::new(Duration::from_secs(
        config.visibility_timeout,
    )));
    let seed: Arc<dyn SeedSource> = match &config.seed_file {
        Some(path) => Arc::new(JsonFileSeed::new(path)),
        None => Arc::new(StaticSeed::builtin()),
    };

    let service = CacheService::new(
        store.clone(),
        broker,
        seed,
        config.service_config(),
        shutdown_rx.clone(),
    );

    let report = service.load_initial_cache().await;
    info!(
        subscribed = report.subscribed,
        entries_loaded = report.entries_loaded,
        "Initial cache load complete"
    );

    let cleanup_handle = spawn_cleanup_task(
        store,
        Duration::from_secs(config.cleanup_interval),
        shutdown_rx.clone(),
    );
    let refresh_handle = spawn_refresh_task(
        service.clone(),
        config.refresh_schedule(),
        shutdown_rx,
    );
    info!("Background tasks started");

    let app = create_router(AppState::new(service.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Wake every background loop and wait for them to finish their cycle
    let _ = shutdown_tx.send(true);
    for (name, handle) in [("cleanup", cleanup_handle), ("refresh", refresh_handle)] {
        if let Err(error) = handle.await {
            warn!(task = name, %error, "Background task ended abnormally");
        }
    }
    service.join_ingestor().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
