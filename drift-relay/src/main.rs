//! drift-relay binary entry point.
//!
//! Usage:
//! ```bash
//! drift-relay --config relay.toml
//! ```

use anyhow::Context;
use drift_relay::sweep::{spawn_stats_task, spawn_sweep_task};
use drift_relay::{Config, RelayServer};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = get_config_path();
    let config = if config_path.exists() {
        Config::from_file(&config_path)
            .with_context(|| format!("loading {}", config_path.display()))?
    } else {
        tracing::info!(
            "no config file at {}, using defaults",
            config_path.display()
        );
        Config::default()
    };

    let listener = TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("binding {}", config.server.bind_address))?;
    tracing::info!("drift-relay listening on {}", listener.local_addr()?);

    let relay = Arc::new(RelayServer::new(config.clone()));
    spawn_sweep_task(Arc::clone(&relay), config.sweep.clone());
    spawn_stats_task(Arc::clone(&relay), config.stats.clone());

    relay.serve(listener).await.context("accept loop failed")?;
    Ok(())
}

fn get_config_path() -> PathBuf {
    std::env::args()
        .skip_while(|arg| arg != "--config")
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("relay.toml"))
}
