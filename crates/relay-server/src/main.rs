//! relay-server binary entry point.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use relay_auth::StaticUserDirectory;
use relay_server::config::RelayConfig;
use relay_server::server::{RelayServer, serve};
use relay_server::metrics;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = RelayConfig::from_env().context("failed to load configuration")?;
    let metrics_handle = metrics::install_recorder();

    let directory = Arc::new(StaticUserDirectory::new());
    for (name, role) in &config.users {
        directory.insert(name, vec![*role]);
    }
    if directory.is_empty() {
        warn!("no users configured (RELAY_USERS); auth will not resolve any identity");
    }

    let server = RelayServer::new(config, directory).with_metrics(metrics_handle);
    server.init().await.context("server initialization failed")?;

    // ctrl-c initiates graceful shutdown
    let shutdown = Arc::clone(server.shutdown_coordinator());
    let _ = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            shutdown.shutdown();
        }
    });

    serve(&server).await.context("server error")?;
    server.stop().await;
    info!("relay server stopped");
    Ok(())
}
