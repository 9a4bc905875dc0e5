// src/main.rs
//! Botlab Server
//!
//! Standalone entrypoint: load configuration, boot the worker set and
//! drive the tick pipeline on a fixed cadence until interrupted.

use anyhow::Result;
use botlab_server::utils::init_tracing;
use botlab_server::{ServerConfig, SimServer, TickOptions};
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    info!("Starting Botlab Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load()?;
    info!("Configuration loaded: {:?}", config);
    let rate = Duration::from_millis(config.tick.rate_ms);

    let mut server = SimServer::new(config);
    server.connect().await?;
    server.start().await?;

    let mut interval = tokio::time::interval(rate);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal, cleaning up...");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = server.tick(TickOptions::default()).await {
                    error!("Tick failed: {e}");
                }
            }
        }
    }

    server.stop();
    info!("Server stopped gracefully");
    Ok(())
}
