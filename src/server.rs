use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::rest::{self, AppState};
use crate::config::DaemonConfig;
use crate::domain::inventory::{FileInventory, FilePropertyStore};
use crate::domain::repository::FileDataSourceRepository;
use crate::domain::update_manager::UpdateManager;

pub async fn run(config: DaemonConfig) -> Result<()> {
    // Init tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "stoker daemon starting");

    // Wire the file-backed collaborators
    let repository = Arc::new(FileDataSourceRepository::new(PathBuf::from(
        &config.store.data_sources_file,
    )));
    let inventory = Arc::new(FileInventory::new(PathBuf::from(
        &config.store.inventory_file,
    )));
    let writer = Arc::new(FilePropertyStore::new(PathBuf::from(
        &config.store.properties_file,
    )));

    let manager = Arc::new(UpdateManager::new(
        repository,
        inventory.clone(),
        inventory,
        writer,
    ));

    // Build schedulers from persisted descriptors, then arm the periodic
    // ones staggered so a restart does not stampede upstream services.
    manager.initialize().await?;
    manager.start_all();

    let state = AppState {
        manager: manager.clone(),
        started_at: Instant::now(),
    };

    let app = rest::router(state).layer(TraceLayer::new_for_http());

    // Bind HTTP listener
    let http_addr = &config.http_addr;
    let listener = TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("binding to {}", http_addr))?;

    info!(addr = %http_addr, "admin API listening");

    // Run HTTP server with graceful shutdown
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("stoker daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
