//! clipcache server
//!
//! # Startup Sequence
//! 1. Initialize tracing subscriber for logging
//! 2. Load configuration from environment variables
//! 3. Connect the store (Postgres when `DATABASE_URL` is set)
//! 4. Warm the feed and start the background tasks
//! 5. Serve HTTP until SIGINT/SIGTERM, then drain the queue

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clipcache::api::create_router;
use clipcache::store::{MemoryStore, PgStore, SourceStore};
use clipcache::{spawn_cleanup_task, spawn_reconcilers, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" for this crate, overridable with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clipcache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clipcache");

    let config = Arc::new(Config::from_env());
    info!(
        "Configuration loaded: port={}, partitions={}, feed_capacity={}, cleanup_interval={}s",
        config.server_port,
        config.queue.partitions,
        config.cache.feed.capacity,
        config.cleanup_interval
    );

    let store = connect_store(&config).await?;
    let state = AppState::from_config(config.clone(), store);
    let engine = state.engine.clone();

    if let Err(err) = engine.warm_up().await {
        warn!(error = %err, "Feed warm-up failed; serving cold");
    }

    let cleanup_handle = spawn_cleanup_task(engine.cache().clone(), config.cleanup_interval);
    let reconcilers = spawn_reconcilers(engine.clone());
    info!("Background tasks started");

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cleanup_handle))
        .await
        .context("server error")?;

    // Stop accepting mutations and let the workers drain what is queued.
    engine.queue().log().close();
    for handle in reconcilers {
        if let Err(err) = handle.await {
            warn!(error = %err, "Reconciler ended abnormally");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn connect_store(config: &Config) -> anyhow::Result<Arc<dyn SourceStore>> {
    match &config.store.database_url {
        Some(url) => {
            let store = PgStore::connect(&config.store, url)
                .await
                .context("failed to connect to Postgres")?;
            store
                .ensure_schema()
                .await
                .context("failed to create schema")?;
            info!("Using Postgres store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("DATABASE_URL not set; using the in-process store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then aborts the cleanup
/// task.
async fn shutdown_signal(cleanup_handle: JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
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

    cleanup_handle.abort();
    warn!("Cleanup task aborted");
}
