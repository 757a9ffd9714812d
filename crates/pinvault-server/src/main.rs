//! `PinVault` server entry point.
//!
//! Opens the long-lived storage backend, builds the PIN gate and credential
//! store, then starts the Axum HTTP server with graceful shutdown. The
//! inactivity watchdog runs alongside the server and is stopped on shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use pinvault_core::watchdog::spawn_watchdog;
use pinvault_storage::{MemoryBackend, StorageBackend};

use pinvault_server::{build_router, with_cors};
use pinvault_server::config::{ServerConfig, StorageBackendType};
use pinvault_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(storage = ?config.storage_backend, "PinVault starting");

    let long = open_storage(&config.storage_backend)?;
    let state = Arc::new(AppState::open(long, config.gate.clone()).await?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let watchdog = spawn_watchdog(Arc::clone(&state.gate), shutdown_rx);

    let app = with_cors(build_router(state), &config.cors_origins);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "PinVault server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .context("server error")?;

    info!("waiting for inactivity watchdog to stop");
    let _ = tokio::time::timeout(Duration::from_secs(5), watchdog).await;

    info!("PinVault server stopped");
    Ok(())
}

fn open_storage(backend: &StorageBackendType) -> anyhow::Result<Arc<dyn StorageBackend>> {
    match backend {
        StorageBackendType::Memory => {
            info!("using in-memory storage (data will not persist)");
            Ok(Arc::new(MemoryBackend::new()))
        }
        #[cfg(feature = "redb-backend")]
        StorageBackendType::Redb { path } => {
            info!(path = %path, "using redb storage");
            Ok(Arc::new(
                pinvault_storage::RedbBackend::open(path).context("failed to open redb storage")?,
            ))
        }
        #[cfg(not(feature = "redb-backend"))]
        StorageBackendType::Redb { .. } => {
            anyhow::bail!("redb backend not compiled in; rebuild with --features redb-backend")
        }
    }
}

/// Wait for SIGINT or SIGTERM, then broadcast shutdown.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
    let _ = shutdown_tx.send(true);
}
