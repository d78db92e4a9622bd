//! Peerlink daemon
//!
//! Reference embedding of the peerlink core: loads configuration,
//! builds a link service over the configured transports and supervises
//! it until interrupted. With `--connect` it skips scanning and dials a
//! single device token directly.

mod config;

use anyhow::{bail, Context, Result};
use clap::Parser;
use config::Config;
use peerlink_core::{
    ConnectFailure, LinkObserver, LinkService, PeerDevice, TcpBinding, TransportBinding,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "peerlink-daemon", version, about = "Peer discovery and auto-connect daemon")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Connect to a single device token (transport://address) instead
    /// of scanning
    #[arg(long)]
    connect: Option<String>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Logs lifecycle events for operators
struct LogObserver;

impl LinkObserver for LogObserver {
    fn on_device_found(&self, device: &PeerDevice) {
        info!("discovered {} ({})", device.name(), device);
    }

    fn on_connection_established(&self, device: &PeerDevice) {
        info!("connected to {}", device.name());
    }

    fn on_connection_failed(&self, device: &PeerDevice, reason: ConnectFailure) {
        warn!("connection to {} failed: {}", device.name(), reason);
    }

    fn on_connection_closed(&self, device: &PeerDevice) {
        info!("connection to {} closed", device.name());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path)?;
    info!("configuration: {}", config_path.display());

    let tcp: Arc<dyn TransportBinding> = Arc::new(TcpBinding::new(config.tcp_binding_config()));
    let service = LinkService::new(vec![tcp], config.link_config());
    service.register_observer(Arc::new(LogObserver));

    match &cli.connect {
        Some(token) => {
            // Manual mode: dial one device, no scanning or supervision.
            let device: PeerDevice = token
                .parse()
                .with_context(|| format!("invalid device token {:?}", token))?;
            info!("manual connection to {}", device.name());
            if !service.request_connect(&device).await {
                bail!("connection request refused");
            }
        }
        None => {
            service.init();
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");
    service.terminate().await;

    Ok(())
}
