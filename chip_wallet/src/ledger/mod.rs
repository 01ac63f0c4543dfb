//! Ledger module: wallets, journals, frozen funds, and the operations over
//! them.
//!
//! This module implements:
//! - Wallet registry with lazy creation and a configurable starting balance
//! - Double-entry style journal with per-wallet caps and filtered queries
//! - Table escrow (frozen funds) for seated players
//! - Daily deposit/withdrawal/buy-in limits
//! - Idempotency cache for safe client retries
//! - Rake aggregation by day, month, and year
//!
//! ## Example
//!
//! ```no_run
//! use chip_wallet::config::WalletConfig;
//! use chip_wallet::ledger::{BuyInRequest, WalletService};
//! use chip_wallet::store::FileStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(FileStore::new("wallet_snapshot.json"));
//!     let service = WalletService::load(WalletConfig::default(), store).await?;
//!
//!     let receipt = service
//!         .buy_in(BuyInRequest {
//!             player_id: "p1".to_string(),
//!             table_id: "t1".to_string(),
//!             amount: 500,
//!         })
//!         .await?;
//!     println!("Seated with {} chips", receipt.chip_count);
//!
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod models;
pub mod service;
pub mod state;

pub use errors::{WalletError, WalletResult};
pub use models::{
    DailyTotals, EntryKind, FreezeReason, FrozenEntry, HOUSE_PLAYER_ID, HandRefund,
    IdempotencyRecord, JournalEntry, PlayerId, RakePeriod, RakeStats, TableId, Wallet, WalletView,
    WinnerShare, WinnerStake,
};
pub use service::{
    BalanceReceipt, BuyInReceipt, BuyInRequest, CashOutReceipt, CashOutRequest,
    CollectRakeReceipt, CollectRakeRequest, DepositRequest, HealthSnapshot, InitializeRequest,
    ProcessWinningsReceipt, ProcessWinningsRequest, RakeStatsView, RollbackBuyInReceipt,
    RollbackBuyInRequest, RollbackHandReceipt, RollbackHandRequest, ServiceStats, SettledAmount,
    TransferReceipt, TransferRequest, WalletService, WithdrawRequest,
};
pub use state::{JournalFilter, ServiceState};
