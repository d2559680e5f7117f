//! marketgate - caching gateway for the game marketplace web client
//!
//! Starts the background refresh worker and serves the HTTP gateway until
//! Ctrl+C, then stops the worker before exiting.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use marketgate::cache::CacheManager;
use marketgate::cli::Cli;
use marketgate::config::Config;
use marketgate::gateway::{self, AppState};
use marketgate::refresh::{RefreshHandle, Refresher};
use marketgate::upstream::{PortalApi, UpstreamClient};

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Loads .env, so RUST_LOG from it reaches the filter below
    let config = Config::from_env()?.with_cli(&cli);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("marketgate=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Configuration loaded: {:?}", config);

    let cache = CacheManager::with_dir(config.cache_dir.clone());
    info!("Disk cache at {}", cache.cache_dir().display());

    let client = UpstreamClient::new(
        config.api_url.clone(),
        config.admin_token.clone(),
        config.upstream_timeout,
    )
    .context("Failed to build HTTP client")?;
    if !client.has_admin_credential() {
        warn!("RPG_TOKEN not set - cache will not function");
    }
    let api: Arc<dyn PortalApi> = Arc::new(client);

    let refresher = Refresher::new(api.clone(), cache.clone(), config.skills_prefetch());
    let refresh = RefreshHandle::new(refresher, config.refresh_config());
    if config.refresh_enabled {
        refresh.start();
    } else {
        info!("Background refresh disabled");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    gateway::serve(listener, AppState::new(cache, api), shutdown_signal()).await?;

    if !refresh.stop().await {
        warn!("Refresh worker did not stop in time");
    }
    info!("Goodbye");
    Ok(())
}
