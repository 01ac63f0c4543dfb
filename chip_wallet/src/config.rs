//! Wallet service configuration.
//!
//! Consolidates all environment variable reads and provides validated
//! configuration with the documented defaults.

use std::time::Duration;

/// Complete wallet service configuration
#[derive(Debug, Clone)]
pub struct WalletConfig {
    /// Balance granted to lazily-created wallets
    pub default_initial_balance: i64,
    /// Journal cap per wallet; oldest entries are evicted beyond this
    pub max_transactions_per_player: usize,
    /// Daily deposit cap per player
    pub daily_deposit_limit: i64,
    /// Daily withdrawal cap per player
    pub daily_withdrawal_limit: i64,
    /// Daily buy-in cap per player
    pub daily_buyin_limit: i64,
    /// Minimum peer-to-peer transfer amount
    pub min_transfer_amount: i64,
    /// Maximum peer-to-peer transfer amount
    pub max_transfer_amount: i64,
    /// Safety timeout after which a held wallet lock may be stolen
    pub lock_timeout: Duration,
    /// Time-to-live for cached idempotent responses
    pub idempotency_ttl: Duration,
    /// Currency tag stamped on every wallet (single currency per deployment)
    pub currency: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            default_initial_balance: 10_000,
            max_transactions_per_player: 1_000,
            daily_deposit_limit: 50_000,
            daily_withdrawal_limit: 25_000,
            daily_buyin_limit: 100_000,
            min_transfer_amount: 1,
            max_transfer_amount: 100_000,
            lock_timeout: Duration::from_millis(30_000),
            idempotency_ttl: Duration::from_millis(24 * 60 * 60 * 1000),
            currency: "CHP".to_string(),
        }
    }
}

impl WalletConfig {
    /// Load configuration from `WALLET_*` environment variables, falling
    /// back to the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_initial_balance: parse_env_or(
                "WALLET_DEFAULT_INITIAL_BALANCE",
                defaults.default_initial_balance,
            ),
            max_transactions_per_player: parse_env_or(
                "WALLET_MAX_TRANSACTIONS_PER_PLAYER",
                defaults.max_transactions_per_player,
            ),
            daily_deposit_limit: parse_env_or(
                "WALLET_DAILY_DEPOSIT_LIMIT",
                defaults.daily_deposit_limit,
            ),
            daily_withdrawal_limit: parse_env_or(
                "WALLET_DAILY_WITHDRAWAL_LIMIT",
                defaults.daily_withdrawal_limit,
            ),
            daily_buyin_limit: parse_env_or("WALLET_DAILY_BUYIN_LIMIT", defaults.daily_buyin_limit),
            min_transfer_amount: parse_env_or(
                "WALLET_MIN_TRANSFER_AMOUNT",
                defaults.min_transfer_amount,
            ),
            max_transfer_amount: parse_env_or(
                "WALLET_MAX_TRANSFER_AMOUNT",
                defaults.max_transfer_amount,
            ),
            lock_timeout: Duration::from_millis(parse_env_or(
                "WALLET_LOCK_TIMEOUT_MS",
                defaults.lock_timeout.as_millis() as u64,
            )),
            idempotency_ttl: Duration::from_millis(parse_env_or(
                "WALLET_IDEMPOTENCY_TTL_MS",
                defaults.idempotency_ttl.as_millis() as u64,
            )),
            currency: std::env::var("WALLET_CURRENCY").unwrap_or(defaults.currency),
        }
    }

    /// Validate configuration after loading
    ///
    /// # Errors
    ///
    /// Returns error for zero caps, inverted transfer bounds, or a zero TTL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_initial_balance < 0 {
            return Err(ConfigError::Invalid {
                var: "WALLET_DEFAULT_INITIAL_BALANCE".to_string(),
                reason: "Must be non-negative".to_string(),
            });
        }

        if self.max_transactions_per_player == 0 {
            return Err(ConfigError::Invalid {
                var: "WALLET_MAX_TRANSACTIONS_PER_PLAYER".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        for (var, value) in [
            ("WALLET_DAILY_DEPOSIT_LIMIT", self.daily_deposit_limit),
            ("WALLET_DAILY_WITHDRAWAL_LIMIT", self.daily_withdrawal_limit),
            ("WALLET_DAILY_BUYIN_LIMIT", self.daily_buyin_limit),
        ] {
            if value <= 0 {
                return Err(ConfigError::Invalid {
                    var: var.to_string(),
                    reason: "Must be greater than 0".to_string(),
                });
            }
        }

        if self.min_transfer_amount <= 0 {
            return Err(ConfigError::Invalid {
                var: "WALLET_MIN_TRANSFER_AMOUNT".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.max_transfer_amount < self.min_transfer_amount {
            return Err(ConfigError::Invalid {
                var: "WALLET_MAX_TRANSFER_AMOUNT".to_string(),
                reason: format!(
                    "Must be at least the minimum transfer amount ({})",
                    self.min_transfer_amount
                ),
            });
        }

        if self.lock_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "WALLET_LOCK_TIMEOUT_MS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.idempotency_ttl.is_zero() {
            return Err(ConfigError::Invalid {
                var: "WALLET_IDEMPOTENCY_TTL_MS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = WalletConfig::default();
        assert_eq!(config.default_initial_balance, 10_000);
        assert_eq!(config.max_transactions_per_player, 1_000);
        assert_eq!(config.daily_deposit_limit, 50_000);
        assert_eq!(config.daily_withdrawal_limit, 25_000);
        assert_eq!(config.daily_buyin_limit, 100_000);
        assert_eq!(config.min_transfer_amount, 1);
        assert_eq!(config.max_transfer_amount, 100_000);
        assert_eq!(config.lock_timeout, Duration::from_secs(30));
        assert_eq!(config.idempotency_ttl, Duration::from_secs(24 * 60 * 60));
        config.validate().expect("defaults should validate");
    }

    #[test]
    fn test_validation_rejects_zero_journal_cap() {
        let config = WalletConfig {
            max_transactions_per_player: 0,
            ..WalletConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_validation_rejects_inverted_transfer_bounds() {
        let config = WalletConfig {
            min_transfer_amount: 500,
            max_transfer_amount: 100,
            ..WalletConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("WALLET_MAX_TRANSFER_AMOUNT"));
    }

    #[test]
    fn test_validation_rejects_zero_daily_caps() {
        let config = WalletConfig {
            daily_withdrawal_limit: 0,
            ..WalletConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
