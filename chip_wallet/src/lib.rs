//! # Chip Wallet
//!
//! A transactional wallet/ledger shard for an online poker platform.
//!
//! One instance owns a set of player wallets and enforces double-entry style
//! bookkeeping across buy-ins, cash-outs, pot settlement, rake collection,
//! deposits, withdrawals, and peer-to-peer transfers, with strict
//! consistency, idempotent retries, and crash recovery.
//!
//! ## Architecture
//!
//! All requests for one wallet serialize through a per-wallet logical lock,
//! so the shard behaves as a single actor per wallet while staying fully
//! parallel across disjoint wallets. Every mutation persists the complete
//! service state as one atomic snapshot before it is acknowledged; a failed
//! write rolls the in-memory state back to its pre-operation image.
//!
//! ## Core Modules
//!
//! - [`ledger`]: wallets, journals, frozen funds, and the operations over them
//! - [`store`]: atomic snapshot persistence (file-backed or in-memory)
//! - [`locks`]: per-wallet lock manager with sorted multi-key acquisition
//! - [`config`]: service limits and defaults
//!
//! ## Example
//!
//! ```no_run
//! use chip_wallet::config::WalletConfig;
//! use chip_wallet::ledger::WalletService;
//! use chip_wallet::store::MemoryStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = WalletService::load(WalletConfig::default(), Arc::new(MemoryStore::new())).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod ledger;
pub mod locks;
pub mod store;

pub use config::WalletConfig;
pub use ledger::{WalletError, WalletResult, WalletService};
pub use locks::LockManager;
pub use store::{FileStore, MemoryStore, SnapshotStore};
