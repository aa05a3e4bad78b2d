//! cumulusd — directory sync daemon. Runs as `cumulusd client` or
//! `cumulusd server`.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;

use cumulus_core::config::CumulusConfig;
use cumulus_services::fs_watch::watch_dir;
use cumulus_services::net::bind_udp;
use cumulus_services::{ClientSettings, StorageDir, StorageServer, SyncClient, SyncStateStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = CumulusConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = CumulusConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        CumulusConfig::default()
    });

    let role = std::env::args().nth(1).unwrap_or_default();
    match role.as_str() {
        "client" => run_client(config).await,
        "server" => run_server(config).await,
        other => anyhow::bail!("usage: cumulusd <client|server> (got {other:?})"),
    }
}

async fn run_client(config: CumulusConfig) -> Result<()> {
    let settings = ClientSettings::from_config(&config);
    std::fs::create_dir_all(&settings.sync_dir)
        .with_context(|| format!("failed to create {}", settings.sync_dir.display()))?;

    let bind = config.client_bind();
    let socket = Arc::new(bind_udp(bind).context("failed to bind client socket")?);
    tracing::info!(
        %bind,
        server = %settings.server,
        sync_dir = %settings.sync_dir.display(),
        chunk_size = settings.chunk_size,
        "cumulusd client starting"
    );

    let (_watcher, fs_events) =
        watch_dir(&settings.sync_dir).context("failed to watch sync directory")?;
    let client = SyncClient::new(socket, settings, SyncStateStore::new())?;
    let handle = client.spawn(fs_events);

    tokio::signal::ctrl_c().await.ok();
    tracing::info!("shutdown signal received");
    handle.shutdown().await;
    Ok(())
}

async fn run_server(config: CumulusConfig) -> Result<()> {
    let storage_dir = config.server.storage_dir.clone();
    std::fs::create_dir_all(&storage_dir)
        .with_context(|| format!("failed to create {}", storage_dir.display()))?;

    let bind = config.server_bind();
    let socket = Arc::new(bind_udp(bind).context("failed to bind server socket")?);
    tracing::info!(
        %bind,
        storage_dir = %storage_dir.display(),
        chunk_size = config.transfer.chunk_size,
        "cumulusd server starting"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    let storage = StorageDir::new(storage_dir, config.transfer.chunk_size);
    StorageServer::new(socket, storage, shutdown_tx.subscribe())
        .run()
        .await?;
    Ok(())
}
