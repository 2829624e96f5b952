use anyhow::Result;
use axum::Router;
use std::{fs, io::ErrorKind, path::Path, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use services::{metadata_store, metadata_store::MetadataStore, upload_service::UploadService};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting upload-service with config: {:?}", cfg);

    // --- Ensure storage layout exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize core service ---
    let metadata = Arc::new(MetadataStore::new(
        Path::new(&cfg.storage_dir).join(metadata_store::INDEX_FILE_NAME),
    ));
    let service = UploadService::new(metadata.clone(), cfg.storage_dir.clone());
    fs::create_dir_all(service.staging_root())?;

    // --- Session reaper ---
    let session_ttl = Duration::from_secs(cfg.session_ttl_secs);
    let reap_interval = Duration::from_secs(cfg.reap_interval_secs);
    let reaper = service.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(reap_interval);
        loop {
            ticker.tick().await;
            let reaped = reaper.reap_expired(session_ttl).await;
            if reaped > 0 {
                tracing::info!("Reaped {} idle upload sessions", reaped);
            }
        }
    });

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(service);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Anything still buffered must reach the log before exit.
    metadata.flush().await?;
    tracing::info!("Metadata index flushed, shutting down");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", err);
    }
}
