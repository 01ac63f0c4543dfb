//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated
//! configuration.

use chip_wallet::config::{ConfigError, WalletConfig};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Snapshot file path
    pub snapshot_path: PathBuf,
    /// Optional Prometheus exporter bind address
    pub metrics_bind: Option<SocketAddr>,
    /// Wallet service limits and defaults
    pub wallet: WalletConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `snapshot_override` - Optional snapshot path override (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if the wallet limits fail validation
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        snapshot_override: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let bind = bind_override
            .or_else(|| {
                std::env::var("SERVER_BIND")
                    .ok()
                    .and_then(|s| s.parse().ok())
            })
            .unwrap_or_else(|| {
                "127.0.0.1:7070"
                    .parse()
                    .expect("Default bind address is valid")
            });

        let snapshot_path = snapshot_override
            .or_else(|| std::env::var("SNAPSHOT_PATH").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("wallet_snapshot.json"));

        let metrics_bind = std::env::var("METRICS_BIND")
            .ok()
            .and_then(|s| s.parse().ok());

        let wallet = WalletConfig::from_env();
        wallet.validate()?;

        Ok(ServerConfig {
            bind,
            snapshot_path,
            metrics_bind,
            wallet,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_overrides() {
        let config = ServerConfig::from_env(None, None).expect("config should load");
        assert_eq!(config.snapshot_path, PathBuf::from("wallet_snapshot.json"));
        assert_eq!(config.wallet.default_initial_balance, 10_000);
    }

    #[test]
    fn test_cli_overrides_take_precedence() {
        let bind: SocketAddr = "0.0.0.0:9999".parse().unwrap();
        let config = ServerConfig::from_env(Some(bind), Some(PathBuf::from("/tmp/snap.json")))
            .expect("config should load");
        assert_eq!(config.bind, bind);
        assert_eq!(config.snapshot_path, PathBuf::from("/tmp/snap.json"));
    }
}
