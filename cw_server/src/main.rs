//! Wallet shard HTTP server.
//!
//! Loads the last committed snapshot, then serves the wallet API until
//! shutdown. One process owns one shard of player wallets.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Error;
use chip_wallet::ledger::WalletService;
use chip_wallet::store::FileStore;
use ctrlc::set_handler;
use cw_server::{api, config::ServerConfig, logging, metrics};
use pico_args::Arguments;
use tracing::info;

const HELP: &str = "\
Run a wallet shard server

USAGE:
  cw_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:7070]
  --snapshot   PATH        Snapshot file path          [default: env SNAPSHOT_PATH or wallet_snapshot.json]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  SNAPSHOT_PATH            Durable snapshot file path
  METRICS_BIND             Optional Prometheus exporter bind address
  WALLET_*                 Wallet limits and defaults (see README)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let bind_override: Option<SocketAddr> = pargs.opt_value_from_str("--bind")?;
    let snapshot_override: Option<PathBuf> = pargs.opt_value_from_str("--snapshot")?;

    // Catching signals for exit.
    set_handler(|| std::process::exit(0))?;

    logging::init();

    let config = ServerConfig::from_env(bind_override, snapshot_override)
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

    info!(
        "Starting wallet shard at {} (snapshot: {})",
        config.bind,
        config.snapshot_path.display()
    );

    if let Some(metrics_bind) = config.metrics_bind {
        metrics::init_metrics(metrics_bind).map_err(Error::msg)?;
        info!("Prometheus metrics exported at http://{metrics_bind}/metrics");
    }

    let store = Arc::new(FileStore::new(&config.snapshot_path));
    let service = Arc::new(
        WalletService::load(config.wallet.clone(), store)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to load wallet snapshot: {e}"))?,
    );

    info!("Wallet shard instance {}", service.instance_id());

    let app = api::create_router(api::AppState::new(service));

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", config.bind, e))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {e}"))?;

    info!("Shutting down server...");

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
}
