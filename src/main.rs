//! Pokebat Battle Server
//!
//! Loads the roster, binds the UDP socket, and serves battles until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pokebat::{BattleServer, RosterStore, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Pokebat Server v{}", VERSION);

    let config = ServerConfig::from_env();
    let roster = RosterStore::load(&config.roster_path)
        .with_context(|| format!("loading roster from {}", config.roster_path.display()))?;

    match config.prompt_timeout {
        Some(limit) => info!("Prompt timeout: {:?}", limit),
        None => info!("Prompt timeout: none"),
    }

    let server = Arc::new(
        BattleServer::bind(config.clone(), roster)
            .await
            .with_context(|| format!("binding {}", config.bind_addr))?,
    );

    let signal_server = server.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => signal_server.shutdown(),
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    server.run().await.context("server stopped")?;
    info!("Server stopped");
    Ok(())
}
