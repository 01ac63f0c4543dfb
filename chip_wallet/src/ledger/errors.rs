//! Wallet/ledger error types.

use crate::store::StoreError;
use thiserror::Error;

/// Wallet errors
#[derive(Debug, Error)]
pub enum WalletError {
    /// Invalid amount (must be positive)
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    /// Malformed or missing request field
    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// Transfer to self
    #[error("Cannot transfer to the same wallet: {0}")]
    SelfTransfer(String),

    /// Transfer amount outside the configured bounds
    #[error("Transfer amount {amount} out of range [{min}, {max}]")]
    TransferOutOfRange { amount: i64, min: i64, max: i64 },

    /// Wallet not found
    #[error("Wallet not found for player {0}")]
    WalletNotFound(String),

    /// Wallet already exists (second initialize)
    #[error("Wallet already exists for player {0}")]
    WalletExists(String),

    /// A frozen entry already holds this seat
    #[error("Player {player_id} already has frozen funds at table {table_id}")]
    SeatOccupied { player_id: String, table_id: String },

    /// No frozen entry for this seat
    #[error("No frozen funds for player {player_id} at table {table_id}")]
    NoFrozenFunds { player_id: String, table_id: String },

    /// Insufficient balance
    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: i64, required: i64 },

    /// Daily limit exceeded
    #[error("Daily {kind} limit exceeded: used {used} of {limit}, requested {requested}")]
    DailyLimitExceeded {
        kind: &'static str,
        used: i64,
        limit: i64,
        requested: i64,
    },

    /// Balance arithmetic overflow
    #[error("Balance overflow for player {0}")]
    BalanceOverflow(String),

    /// Lock acquisition timed out
    #[error("Lock acquisition timed out for {0}")]
    LockTimeout(String),

    /// Snapshot persistence error
    #[error("Snapshot store error: {0}")]
    Store(#[from] StoreError),
}

impl WalletError {
    /// Whether this error is an internal fault (5xx territory) rather than a
    /// client error.
    pub fn is_internal(&self) -> bool {
        matches!(self, WalletError::LockTimeout(_) | WalletError::Store(_))
    }
}

/// Result type for wallet operations
pub type WalletResult<T> = Result<T, WalletError>;
