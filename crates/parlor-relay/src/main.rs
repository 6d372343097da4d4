//! parlor relay server.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parlor_core::auth::StaticAdmin;
use parlor_relay::{BanStore, RelayState, api, config::Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let bans = BanStore::open(&config.ban_file);
    tracing::info!("Ban file:   {}", bans.path().display());
    let admin = Arc::new(StaticAdmin::new(config.admin_name.clone()));
    tracing::info!("Admin name: {}", admin.name());
    let state = Arc::new(RelayState::new(bans, admin, config.relay_options()));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!("parlor relay listening on {}", config.listen_addr);
    tracing::info!("WebSocket:  ws://{}/ws", config.listen_addr);

    api::serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutting down");
    })
    .await
    .context("server error")?;
    Ok(())
}
