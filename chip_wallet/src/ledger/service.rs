//! Wallet service implementation: one operation per HTTP endpoint.
//!
//! Every mutating operation runs the same pipeline: validate, acquire the
//! wallet lock(s), re-check preconditions under the lock, capture a
//! pre-image of the substructures about to change, apply, persist the full
//! snapshot, release. A failed snapshot write restores the pre-image under
//! the same lock, so in-memory state never runs ahead of durable state.

use super::errors::{WalletError, WalletResult};
use super::models::{
    EntryKind, FreezeReason, HOUSE_PLAYER_ID, HandRefund, IdempotencyRecord, JournalEntry,
    PlayerId, RakePeriod, TableId, WalletView, WinnerShare, WinnerStake,
};
use super::state::{JournalFilter, PreImage, ServiceState};
use crate::config::WalletConfig;
use crate::locks::LockManager;
use crate::store::SnapshotStore;
use chrono::{DateTime, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Default and maximum page sizes for journal queries.
const DEFAULT_QUERY_LIMIT: usize = 50;
const MAX_QUERY_LIMIT: usize = 500;

// ----------------------------------------------------------------------
// Request payloads (wire form: camelCase JSON)
// ----------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequest {
    pub player_id: PlayerId,
    #[serde(default)]
    pub initial_balance: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyInRequest {
    pub player_id: PlayerId,
    pub table_id: TableId,
    pub amount: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashOutRequest {
    pub player_id: PlayerId,
    pub table_id: TableId,
    pub chip_amount: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessWinningsRequest {
    pub table_id: TableId,
    pub hand_id: String,
    pub winners: Vec<WinnerStake>,
    pub losers: Vec<WinnerStake>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    pub player_id: PlayerId,
    pub amount: i64,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequest {
    pub player_id: PlayerId,
    pub amount: i64,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub from_player_id: PlayerId,
    pub to_player_id: PlayerId,
    pub amount: i64,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackBuyInRequest {
    pub player_id: PlayerId,
    pub table_id: TableId,
    pub amount: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackHandRequest {
    pub table_id: TableId,
    pub hand_id: String,
    pub players: Vec<HandRefund>,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectRakeRequest {
    pub table_id: TableId,
    pub hand_id: String,
    pub pot_amount: i64,
    pub rake_percentage: f64,
    pub max_rake: i64,
    #[serde(default)]
    pub winner_player_id: Option<PlayerId>,
    #[serde(default)]
    pub winners: Option<Vec<WinnerShare>>,
}

// ----------------------------------------------------------------------
// Operation receipts (wire form: camelCase JSON)
// ----------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyInReceipt {
    pub chip_count: i64,
    pub wallet_balance: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashOutReceipt {
    pub player_id: PlayerId,
    pub table_id: TableId,
    pub chip_amount: i64,
    pub original_buy_in: i64,
    pub net_change: i64,
    pub balance: i64,
    pub available: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceReceipt {
    pub player_id: PlayerId,
    pub amount: i64,
    pub balance: i64,
    pub available: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettledAmount {
    pub player_id: PlayerId,
    pub amount: i64,
    pub balance: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessWinningsReceipt {
    pub table_id: TableId,
    pub hand_id: String,
    pub winners: Vec<SettledAmount>,
    pub losers: Vec<SettledAmount>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub transfer_id: Uuid,
    pub from_player_id: PlayerId,
    pub to_player_id: PlayerId,
    pub amount: i64,
    pub from_balance: i64,
    pub to_balance: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackBuyInReceipt {
    pub player_id: PlayerId,
    pub table_id: TableId,
    pub refunded: i64,
    pub balance: i64,
    pub available: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackHandReceipt {
    pub table_id: TableId,
    pub hand_id: String,
    pub refunds: Vec<SettledAmount>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectRakeReceipt {
    pub table_id: TableId,
    pub hand_id: String,
    pub pot_amount: i64,
    pub rake: i64,
    pub net_pot: i64,
    pub house_balance: i64,
    pub payouts: Vec<SettledAmount>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub total_wallets: usize,
    pub active_wallets: usize,
    pub total_balance: i64,
    pub total_frozen: i64,
    pub total_transactions: u64,
    pub journal_entries: usize,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RakeStatsView {
    pub period: String,
    pub label: String,
    pub total_rake: i64,
    pub hand_count: u64,
    pub average_rake: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub instance_id: String,
    pub uptime_seconds: i64,
    pub wallet_count: usize,
    pub journal_entries: usize,
    pub frozen_total: i64,
    pub total_transactions: u64,
}

// ----------------------------------------------------------------------
// Service
// ----------------------------------------------------------------------

/// The wallet shard: owns the full service state, the per-wallet lock
/// manager, and the snapshot store.
pub struct WalletService {
    config: WalletConfig,
    locks: LockManager,
    store: Arc<dyn SnapshotStore>,
    state: RwLock<ServiceState>,
    instance_id: String,
}

impl WalletService {
    /// Load the last committed snapshot (or start empty) and build the
    /// service.
    pub async fn load(config: WalletConfig, store: Arc<dyn SnapshotStore>) -> WalletResult<Self> {
        let state = store.load().await?.unwrap_or_default();
        info!(
            "Wallet shard loaded: {} wallets, {} journal entries, {} frozen entries",
            state.wallet_count(),
            state.journal_entry_count(),
            state.frozen_entry_count()
        );

        Ok(Self {
            locks: LockManager::new(config.lock_timeout),
            store,
            state: RwLock::new(state),
            instance_id: Uuid::new_v4().to_string(),
            config,
        })
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Total wallet-lock steals since startup (a steal indicates a wedged
    /// holder; it should stay at zero).
    pub fn lock_steals(&self) -> u64 {
        self.locks.steal_count()
    }

    // ------------------------------------------------------------------
    // Mutating operations
    // ------------------------------------------------------------------

    /// Explicitly create a wallet, failing if it already exists.
    pub async fn initialize(&self, req: InitializeRequest) -> WalletResult<WalletView> {
        require_id("playerId", &req.player_id)?;
        let initial = req
            .initial_balance
            .unwrap_or(self.config.default_initial_balance);
        if initial < 0 {
            return Err(WalletError::InvalidAmount(initial));
        }

        let _lock = self.locks.acquire(&req.player_id).await?;
        let mut state = self.state.write().await;
        let now = self.sweep(&mut state);

        if state.wallet(&req.player_id).is_some() {
            return Err(WalletError::WalletExists(req.player_id));
        }

        let pre = PreImage::capture(&state, &[&req.player_id], now);
        state.create_wallet(&req.player_id, initial, &self.config.currency)?;
        self.commit(&mut state, pre).await?;

        Ok(state.view(&req.player_id).expect("wallet just created"))
    }

    /// Freeze a buy-in against a seat.
    ///
    /// The wallet balance is unchanged; the frozen sum grows, shrinking the
    /// available balance. At most one frozen entry may exist per
    /// `(player, table)`.
    pub async fn buy_in(&self, req: BuyInRequest) -> WalletResult<BuyInReceipt> {
        require_id("playerId", &req.player_id)?;
        require_id("tableId", &req.table_id)?;
        require_positive(req.amount)?;

        let _lock = self.locks.acquire(&req.player_id).await?;
        let mut state = self.state.write().await;
        let now = self.sweep(&mut state);

        // Validate against the wallet as it would exist after lazy creation;
        // nothing is created until every precondition has passed.
        let balance = state
            .wallet(&req.player_id)
            .map(|w| w.balance)
            .unwrap_or(self.config.default_initial_balance);

        if state.has_frozen(&req.player_id, &req.table_id) {
            return Err(WalletError::SeatOccupied {
                player_id: req.player_id,
                table_id: req.table_id,
            });
        }

        let used = state.daily_totals(&req.player_id, now.date_naive()).buy_ins;
        if used + req.amount > self.config.daily_buyin_limit {
            return Err(WalletError::DailyLimitExceeded {
                kind: "buy-in",
                used,
                limit: self.config.daily_buyin_limit,
                requested: req.amount,
            });
        }

        let available = balance - state.frozen_sum(&req.player_id);
        if available < req.amount {
            return Err(WalletError::InsufficientBalance {
                available,
                required: req.amount,
            });
        }

        let pre = PreImage::capture(&state, &[&req.player_id], now);

        state.get_or_create_wallet(
            &req.player_id,
            self.config.default_initial_balance,
            &self.config.currency,
        );
        state.freeze(&req.player_id, &req.table_id, req.amount, FreezeReason::BuyIn);
        state.daily_totals_mut(&req.player_id, now.date_naive()).buy_ins += req.amount;
        self.push(
            &mut state,
            JournalEntry {
                id: Uuid::new_v4(),
                player_id: req.player_id.clone(),
                kind: EntryKind::BuyIn,
                amount: -req.amount,
                post_balance: balance,
                table_id: Some(req.table_id.clone()),
                hand_id: None,
                related_player_id: None,
                description: Some(format!("Buy-in to table {}", req.table_id)),
                metadata: None,
                timestamp: now,
            },
        );

        self.commit(&mut state, pre).await?;

        Ok(BuyInReceipt {
            chip_count: req.amount,
            wallet_balance: state.available(&req.player_id),
        })
    }

    /// Settle a seat: release the frozen entry and apply the chip delta.
    ///
    /// `chip_amount` is what the player stands up with; the wallet changes
    /// by `chip_amount - original buy-in`, which may be negative. A zero
    /// `chip_amount` busts the seat and forfeits the whole buy-in.
    pub async fn cash_out(&self, req: CashOutRequest) -> WalletResult<CashOutReceipt> {
        require_id("playerId", &req.player_id)?;
        require_id("tableId", &req.table_id)?;
        if req.chip_amount < 0 {
            return Err(WalletError::InvalidAmount(req.chip_amount));
        }

        let _lock = self.locks.acquire(&req.player_id).await?;
        let mut state = self.state.write().await;
        let now = self.sweep(&mut state);

        if state.wallet(&req.player_id).is_none() {
            return Err(WalletError::WalletNotFound(req.player_id));
        }
        if !state.has_frozen(&req.player_id, &req.table_id) {
            return Err(WalletError::NoFrozenFunds {
                player_id: req.player_id,
                table_id: req.table_id,
            });
        }

        let pre = PreImage::capture(&state, &[&req.player_id], now);

        let frozen = state
            .release_frozen(&req.player_id, &req.table_id)
            .expect("frozen entry checked above");
        let net_change = req.chip_amount - frozen.amount;

        let balance = state.wallet(&req.player_id).expect("wallet checked above").balance;
        let new_balance = match balance.checked_add(net_change) {
            Some(balance) => balance,
            None => {
                pre.restore(&mut state);
                return Err(WalletError::BalanceOverflow(req.player_id));
            }
        };

        let wallet = state.wallet_mut(&req.player_id).expect("wallet checked above");
        wallet.balance = new_balance;
        wallet.last_updated = now;

        self.push(
            &mut state,
            JournalEntry {
                id: Uuid::new_v4(),
                player_id: req.player_id.clone(),
                kind: EntryKind::CashOut,
                amount: req.chip_amount,
                post_balance: new_balance,
                table_id: Some(req.table_id.clone()),
                hand_id: None,
                related_player_id: None,
                description: Some(format!("Cash-out from table {}", req.table_id)),
                metadata: Some(json!({
                    "originalBuyIn": frozen.amount,
                    "netChange": net_change,
                })),
                timestamp: now,
            },
        );

        self.commit(&mut state, pre).await?;

        Ok(CashOutReceipt {
            available: state.available(&req.player_id),
            player_id: req.player_id,
            table_id: req.table_id,
            chip_amount: req.chip_amount,
            original_buy_in: frozen.amount,
            net_change,
            balance: new_balance,
        })
    }

    /// Apply a settled hand: debit every loser, credit every winner, all in
    /// one snapshot.
    ///
    /// Pot conservation is NOT enforced here; the game engine owns that
    /// invariant and this service records whatever it presents.
    pub async fn process_winnings(
        &self,
        req: ProcessWinningsRequest,
    ) -> WalletResult<ProcessWinningsReceipt> {
        require_id("tableId", &req.table_id)?;
        require_id("handId", &req.hand_id)?;
        for stake in req.winners.iter().chain(req.losers.iter()) {
            require_id("playerId", &stake.player_id)?;
            require_positive(stake.amount)?;
        }

        let mut keys: Vec<&str> = req
            .winners
            .iter()
            .chain(req.losers.iter())
            .map(|s| s.player_id.as_str())
            .collect();
        keys.sort_unstable();
        keys.dedup();
        let keys: Vec<String> = keys.into_iter().map(String::from).collect();

        let _lock = self.locks.acquire_many(&keys).await?;
        let mut state = self.state.write().await;
        let now = self.sweep(&mut state);

        // Plan all debits and credits before touching anything: a batch
        // either applies in full or not at all. Absent wallets are planned
        // at the lazy-creation starting balance.
        let mut balances: HashMap<&str, i64> = HashMap::new();
        for loser in &req.losers {
            let balance = *balances
                .entry(loser.player_id.as_str())
                .or_insert_with(|| {
                    state
                        .wallet(&loser.player_id)
                        .map(|w| w.balance)
                        .unwrap_or(self.config.default_initial_balance)
                });
            if balance < loser.amount {
                return Err(WalletError::InsufficientBalance {
                    available: balance,
                    required: loser.amount,
                });
            }
            balances.insert(loser.player_id.as_str(), balance - loser.amount);
        }
        for winner in &req.winners {
            let balance = *balances
                .entry(winner.player_id.as_str())
                .or_insert_with(|| {
                    state
                        .wallet(&winner.player_id)
                        .map(|w| w.balance)
                        .unwrap_or(self.config.default_initial_balance)
                });
            let new_balance = balance
                .checked_add(winner.amount)
                .ok_or_else(|| WalletError::BalanceOverflow(winner.player_id.clone()))?;
            balances.insert(winner.player_id.as_str(), new_balance);
        }
        drop(balances);

        let pre = PreImage::capture(&state, &keys, now);

        let mut losers = Vec::with_capacity(req.losers.len());
        for loser in &req.losers {
            let balance = self.apply_delta(&mut state, &loser.player_id, -loser.amount, now);
            self.push(
                &mut state,
                JournalEntry {
                    id: Uuid::new_v4(),
                    player_id: loser.player_id.clone(),
                    kind: EntryKind::Loss,
                    amount: -loser.amount,
                    post_balance: balance,
                    table_id: Some(req.table_id.clone()),
                    hand_id: Some(req.hand_id.clone()),
                    related_player_id: None,
                    description: Some(format!("Loss in hand {}", req.hand_id)),
                    metadata: None,
                    timestamp: now,
                },
            );
            losers.push(SettledAmount {
                player_id: loser.player_id.clone(),
                amount: -loser.amount,
                balance,
            });
        }

        let mut winners = Vec::with_capacity(req.winners.len());
        for winner in &req.winners {
            let balance = self.apply_delta(&mut state, &winner.player_id, winner.amount, now);
            self.push(
                &mut state,
                JournalEntry {
                    id: Uuid::new_v4(),
                    player_id: winner.player_id.clone(),
                    kind: EntryKind::Win,
                    amount: winner.amount,
                    post_balance: balance,
                    table_id: Some(req.table_id.clone()),
                    hand_id: Some(req.hand_id.clone()),
                    related_player_id: None,
                    description: Some(format!("Win in hand {}", req.hand_id)),
                    metadata: None,
                    timestamp: now,
                },
            );
            winners.push(SettledAmount {
                player_id: winner.player_id.clone(),
                amount: winner.amount,
                balance,
            });
        }

        self.commit(&mut state, pre).await?;

        Ok(ProcessWinningsReceipt {
            table_id: req.table_id,
            hand_id: req.hand_id,
            winners,
            losers,
        })
    }

    /// Credit external funds.
    pub async fn deposit(&self, req: DepositRequest) -> WalletResult<BalanceReceipt> {
        require_id("playerId", &req.player_id)?;
        require_positive(req.amount)?;

        let _lock = self.locks.acquire(&req.player_id).await?;
        let mut state = self.state.write().await;
        let now = self.sweep(&mut state);

        let used = state.daily_totals(&req.player_id, now.date_naive()).deposits;
        if used + req.amount > self.config.daily_deposit_limit {
            return Err(WalletError::DailyLimitExceeded {
                kind: "deposit",
                used,
                limit: self.config.daily_deposit_limit,
                requested: req.amount,
            });
        }

        let balance = state
            .wallet(&req.player_id)
            .map(|w| w.balance)
            .unwrap_or(self.config.default_initial_balance);
        let new_balance = balance
            .checked_add(req.amount)
            .ok_or_else(|| WalletError::BalanceOverflow(req.player_id.clone()))?;

        let pre = PreImage::capture(&state, &[&req.player_id], now);

        let wallet = state.get_or_create_wallet(
            &req.player_id,
            self.config.default_initial_balance,
            &self.config.currency,
        );
        wallet.balance = new_balance;
        wallet.last_updated = now;
        state.daily_totals_mut(&req.player_id, now.date_naive()).deposits += req.amount;
        self.push(
            &mut state,
            JournalEntry {
                id: Uuid::new_v4(),
                player_id: req.player_id.clone(),
                kind: EntryKind::Deposit,
                amount: req.amount,
                post_balance: new_balance,
                table_id: None,
                hand_id: None,
                related_player_id: None,
                description: req.description.clone(),
                metadata: None,
                timestamp: now,
            },
        );

        self.commit(&mut state, pre).await?;

        Ok(BalanceReceipt {
            available: state.available(&req.player_id),
            player_id: req.player_id,
            amount: req.amount,
            balance: new_balance,
        })
    }

    /// Debit external funds.
    pub async fn withdraw(&self, req: WithdrawRequest) -> WalletResult<BalanceReceipt> {
        require_id("playerId", &req.player_id)?;
        require_positive(req.amount)?;

        let _lock = self.locks.acquire(&req.player_id).await?;
        let mut state = self.state.write().await;
        let now = self.sweep(&mut state);

        if state.wallet(&req.player_id).is_none() {
            return Err(WalletError::WalletNotFound(req.player_id));
        }

        let used = state
            .daily_totals(&req.player_id, now.date_naive())
            .withdrawals;
        if used + req.amount > self.config.daily_withdrawal_limit {
            return Err(WalletError::DailyLimitExceeded {
                kind: "withdrawal",
                used,
                limit: self.config.daily_withdrawal_limit,
                requested: req.amount,
            });
        }

        let available = state.available(&req.player_id);
        if available < req.amount {
            return Err(WalletError::InsufficientBalance {
                available,
                required: req.amount,
            });
        }

        let pre = PreImage::capture(&state, &[&req.player_id], now);

        let wallet = state.wallet_mut(&req.player_id).expect("wallet checked above");
        let new_balance = wallet.balance - req.amount;
        wallet.balance = new_balance;
        wallet.last_updated = now;
        state
            .daily_totals_mut(&req.player_id, now.date_naive())
            .withdrawals += req.amount;
        self.push(
            &mut state,
            JournalEntry {
                id: Uuid::new_v4(),
                player_id: req.player_id.clone(),
                kind: EntryKind::Withdrawal,
                amount: -req.amount,
                post_balance: new_balance,
                table_id: None,
                hand_id: None,
                related_player_id: None,
                description: req.description.clone(),
                metadata: None,
                timestamp: now,
            },
        );

        self.commit(&mut state, pre).await?;

        Ok(BalanceReceipt {
            available: state.available(&req.player_id),
            player_id: req.player_id,
            amount: req.amount,
            balance: new_balance,
        })
    }

    /// Peer-to-peer transfer: two linked journal entries, one snapshot.
    pub async fn transfer(&self, req: TransferRequest) -> WalletResult<TransferReceipt> {
        require_id("fromPlayerId", &req.from_player_id)?;
        require_id("toPlayerId", &req.to_player_id)?;
        if req.from_player_id == req.to_player_id {
            return Err(WalletError::SelfTransfer(req.from_player_id));
        }
        if req.amount < self.config.min_transfer_amount
            || req.amount > self.config.max_transfer_amount
        {
            return Err(WalletError::TransferOutOfRange {
                amount: req.amount,
                min: self.config.min_transfer_amount,
                max: self.config.max_transfer_amount,
            });
        }

        // Both locks in sorted key order regardless of direction.
        let _lock = self
            .locks
            .acquire_pair(&req.from_player_id, &req.to_player_id)
            .await?;
        let mut state = self.state.write().await;
        let now = self.sweep(&mut state);

        if state.wallet(&req.from_player_id).is_none() {
            return Err(WalletError::WalletNotFound(req.from_player_id));
        }

        // Re-check under the lock; the pre-lock view cannot be trusted.
        let available = state.available(&req.from_player_id);
        if available < req.amount {
            return Err(WalletError::InsufficientBalance {
                available,
                required: req.amount,
            });
        }

        let to_balance = state
            .wallet(&req.to_player_id)
            .map(|w| w.balance)
            .unwrap_or(self.config.default_initial_balance);
        let new_to_balance = to_balance
            .checked_add(req.amount)
            .ok_or_else(|| WalletError::BalanceOverflow(req.to_player_id.clone()))?;

        let pre = PreImage::capture(
            &state,
            &[&req.from_player_id, &req.to_player_id],
            now,
        );

        let transfer_id = Uuid::new_v4();

        let from_wallet = state
            .wallet_mut(&req.from_player_id)
            .expect("wallet checked above");
        let new_from_balance = from_wallet.balance - req.amount;
        from_wallet.balance = new_from_balance;
        from_wallet.last_updated = now;

        let to_wallet = state.get_or_create_wallet(
            &req.to_player_id,
            self.config.default_initial_balance,
            &self.config.currency,
        );
        to_wallet.balance = new_to_balance;
        to_wallet.last_updated = now;

        self.push(
            &mut state,
            JournalEntry {
                id: Uuid::new_v4(),
                player_id: req.from_player_id.clone(),
                kind: EntryKind::Transfer,
                amount: -req.amount,
                post_balance: new_from_balance,
                table_id: None,
                hand_id: None,
                related_player_id: Some(req.to_player_id.clone()),
                description: req.description.clone(),
                metadata: Some(json!({
                    "transferId": transfer_id,
                    "direction": "outgoing",
                })),
                timestamp: now,
            },
        );
        self.push(
            &mut state,
            JournalEntry {
                id: Uuid::new_v4(),
                player_id: req.to_player_id.clone(),
                kind: EntryKind::Transfer,
                amount: req.amount,
                post_balance: new_to_balance,
                table_id: None,
                hand_id: None,
                related_player_id: Some(req.from_player_id.clone()),
                description: req.description.clone(),
                metadata: Some(json!({
                    "transferId": transfer_id,
                    "direction": "incoming",
                })),
                timestamp: now,
            },
        );

        self.commit(&mut state, pre).await?;

        Ok(TransferReceipt {
            transfer_id,
            from_player_id: req.from_player_id,
            to_player_id: req.to_player_id,
            amount: req.amount,
            from_balance: new_from_balance,
            to_balance: new_to_balance,
        })
    }

    /// Release a frozen buy-in back to the available balance.
    pub async fn rollback_buy_in(
        &self,
        req: RollbackBuyInRequest,
    ) -> WalletResult<RollbackBuyInReceipt> {
        require_id("playerId", &req.player_id)?;
        require_id("tableId", &req.table_id)?;
        require_positive(req.amount)?;

        let _lock = self.locks.acquire(&req.player_id).await?;
        let mut state = self.state.write().await;
        let now = self.sweep(&mut state);

        if state.wallet(&req.player_id).is_none() {
            return Err(WalletError::WalletNotFound(req.player_id));
        }
        if !state.has_frozen(&req.player_id, &req.table_id) {
            return Err(WalletError::NoFrozenFunds {
                player_id: req.player_id,
                table_id: req.table_id,
            });
        }

        let pre = PreImage::capture(&state, &[&req.player_id], now);

        let frozen = state
            .release_frozen(&req.player_id, &req.table_id)
            .expect("frozen entry checked above");
        let balance = state.wallet(&req.player_id).expect("wallet checked above").balance;

        // The refund cancels the buy-in entry; the balance itself never
        // moved, the chips just return to the available pool.
        self.push(
            &mut state,
            JournalEntry {
                id: Uuid::new_v4(),
                player_id: req.player_id.clone(),
                kind: EntryKind::Refund,
                amount: frozen.amount,
                post_balance: balance,
                table_id: Some(req.table_id.clone()),
                hand_id: None,
                related_player_id: None,
                description: Some(format!("Buy-in rollback for table {}", req.table_id)),
                metadata: Some(json!({ "reason": req.reason })),
                timestamp: now,
            },
        );

        self.commit(&mut state, pre).await?;

        Ok(RollbackBuyInReceipt {
            available: state.available(&req.player_id),
            player_id: req.player_id,
            table_id: req.table_id,
            refunded: frozen.amount,
            balance,
        })
    }

    /// Refund a voided hand to every affected player.
    pub async fn rollback_hand(
        &self,
        req: RollbackHandRequest,
    ) -> WalletResult<RollbackHandReceipt> {
        require_id("tableId", &req.table_id)?;
        require_id("handId", &req.hand_id)?;
        if req.players.is_empty() {
            return Err(WalletError::InvalidField {
                field: "players",
                reason: "must not be empty".to_string(),
            });
        }
        for refund in &req.players {
            require_id("playerId", &refund.player_id)?;
            require_positive(refund.refund_amount)?;
        }

        let keys: Vec<&str> = req.players.iter().map(|p| p.player_id.as_str()).collect();
        let _lock = self.locks.acquire_many(&keys).await?;
        let keys: Vec<String> = keys.into_iter().map(String::from).collect();
        let mut state = self.state.write().await;
        let now = self.sweep(&mut state);

        // All credits must be applicable before any is applied. Absent
        // wallets are planned at the lazy-creation starting balance.
        let mut balances: HashMap<&str, i64> = HashMap::new();
        for refund in &req.players {
            let balance = *balances
                .entry(refund.player_id.as_str())
                .or_insert_with(|| {
                    state
                        .wallet(&refund.player_id)
                        .map(|w| w.balance)
                        .unwrap_or(self.config.default_initial_balance)
                });
            let new_balance = balance
                .checked_add(refund.refund_amount)
                .ok_or_else(|| WalletError::BalanceOverflow(refund.player_id.clone()))?;
            balances.insert(refund.player_id.as_str(), new_balance);
        }
        drop(balances);

        let pre = PreImage::capture(&state, &keys, now);

        let mut refunds = Vec::with_capacity(req.players.len());
        for refund in &req.players {
            let balance =
                self.apply_delta(&mut state, &refund.player_id, refund.refund_amount, now);
            self.push(
                &mut state,
                JournalEntry {
                    id: Uuid::new_v4(),
                    player_id: refund.player_id.clone(),
                    kind: EntryKind::Refund,
                    amount: refund.refund_amount,
                    post_balance: balance,
                    table_id: Some(req.table_id.clone()),
                    hand_id: Some(req.hand_id.clone()),
                    related_player_id: None,
                    description: Some(format!("Refund for voided hand {}", req.hand_id)),
                    metadata: Some(json!({ "reason": req.reason })),
                    timestamp: now,
                },
            );
            refunds.push(SettledAmount {
                player_id: refund.player_id.clone(),
                amount: refund.refund_amount,
                balance,
            });
        }

        self.commit(&mut state, pre).await?;

        Ok(RollbackHandReceipt {
            table_id: req.table_id,
            hand_id: req.hand_id,
            refunds,
        })
    }

    /// Extract rake from a pot and pay out the remainder in one step.
    pub async fn collect_rake(&self, req: CollectRakeRequest) -> WalletResult<CollectRakeReceipt> {
        require_id("tableId", &req.table_id)?;
        require_id("handId", &req.hand_id)?;
        require_positive(req.pot_amount)?;
        if !req.rake_percentage.is_finite() || !(0.0..=100.0).contains(&req.rake_percentage) {
            return Err(WalletError::InvalidField {
                field: "rakePercentage",
                reason: "must be between 0 and 100".to_string(),
            });
        }
        if req.max_rake < 0 {
            return Err(WalletError::InvalidAmount(req.max_rake));
        }

        let winners: Vec<WinnerShare> = match (&req.winner_player_id, &req.winners) {
            (Some(winner), None) => {
                require_id("winnerPlayerId", winner)?;
                vec![WinnerShare {
                    player_id: winner.clone(),
                    share: 1.0,
                }]
            }
            (None, Some(winners)) if !winners.is_empty() => {
                for winner in winners {
                    require_id("playerId", &winner.player_id)?;
                    if !winner.share.is_finite() || winner.share <= 0.0 || winner.share > 1.0 {
                        return Err(WalletError::InvalidField {
                            field: "share",
                            reason: "must be in (0, 1]".to_string(),
                        });
                    }
                }
                winners.clone()
            }
            _ => {
                return Err(WalletError::InvalidField {
                    field: "winners",
                    reason: "exactly one of winnerPlayerId or winners is required".to_string(),
                });
            }
        };

        let rake = compute_rake(req.pot_amount, req.rake_percentage, req.max_rake);
        let net_pot = req.pot_amount - rake;

        let mut keys: Vec<&str> = winners.iter().map(|w| w.player_id.as_str()).collect();
        keys.push(HOUSE_PLAYER_ID);
        keys.sort_unstable();
        keys.dedup();
        let keys: Vec<String> = keys.into_iter().map(String::from).collect();

        let _lock = self.locks.acquire_many(&keys).await?;
        let mut state = self.state.write().await;
        let now = self.sweep(&mut state);

        // Per-winner payouts truncate; any fractional remainder is retained
        // rather than assigned.
        let payouts: Vec<(PlayerId, i64)> = if winners.len() == 1 {
            vec![(winners[0].player_id.clone(), net_pot)]
        } else {
            winners
                .iter()
                .map(|w| {
                    let payout = ((net_pot as f64) * w.share).floor() as i64;
                    (w.player_id.clone(), payout.max(0))
                })
                .collect()
        };

        let pre = PreImage::capture(&state, &keys, now);

        // The house sink starts at zero; it only ever accumulates rake.
        state.get_or_create_wallet(HOUSE_PLAYER_ID, 0, &self.config.currency);
        let house_balance = if rake > 0 {
            let balance = self.apply_delta(&mut state, HOUSE_PLAYER_ID, rake, now);
            self.push(
                &mut state,
                JournalEntry {
                    id: Uuid::new_v4(),
                    player_id: HOUSE_PLAYER_ID.to_string(),
                    kind: EntryKind::Rake,
                    amount: rake,
                    post_balance: balance,
                    table_id: Some(req.table_id.clone()),
                    hand_id: Some(req.hand_id.clone()),
                    related_player_id: None,
                    description: Some(format!("Rake from hand {}", req.hand_id)),
                    metadata: Some(json!({
                        "potAmount": req.pot_amount,
                        "rakePercentage": req.rake_percentage,
                        "maxRake": req.max_rake,
                    })),
                    timestamp: now,
                },
            );
            balance
        } else {
            state.wallet(HOUSE_PLAYER_ID).expect("house ensured").balance
        };

        let mut settled = Vec::with_capacity(payouts.len());
        for (player_id, payout) in &payouts {
            if *payout == 0 {
                continue;
            }
            let balance = self.apply_delta(&mut state, player_id, *payout, now);
            self.push(
                &mut state,
                JournalEntry {
                    id: Uuid::new_v4(),
                    player_id: player_id.clone(),
                    kind: EntryKind::Win,
                    amount: *payout,
                    post_balance: balance,
                    table_id: Some(req.table_id.clone()),
                    hand_id: Some(req.hand_id.clone()),
                    related_player_id: None,
                    description: Some(format!("Pot payout for hand {}", req.hand_id)),
                    metadata: None,
                    timestamp: now,
                },
            );
            settled.push(SettledAmount {
                player_id: player_id.clone(),
                amount: *payout,
                balance,
            });
        }

        state.record_rake(rake, now);

        self.commit(&mut state, pre).await?;

        Ok(CollectRakeReceipt {
            table_id: req.table_id,
            hand_id: req.hand_id,
            pot_amount: req.pot_amount,
            rake,
            net_pot,
            house_balance,
            payouts: settled,
        })
    }

    // ------------------------------------------------------------------
    // Idempotency cache (first request wins; replays return its response)
    // ------------------------------------------------------------------

    /// Cached response for an idempotency key, if any.
    pub async fn idempotency_lookup(&self, key: &str) -> Option<IdempotencyRecord> {
        let state = self.state.read().await;
        state
            .idempotency_get(key, Utc::now(), self.config.idempotency_ttl)
            .cloned()
    }

    /// Cache the response produced for an idempotency key.
    ///
    /// The record rides along in the next persisted snapshot; a crash
    /// between caching and the next mutation forgets the key, which at
    /// worst re-executes one already-acknowledged request on retry.
    pub async fn idempotency_store(&self, key: &str, status: u16, body: String) {
        let mut state = self.state.write().await;
        state.idempotency_put(
            key,
            IdempotencyRecord {
                body,
                status,
                created_at: Utc::now(),
            },
        );
    }

    // ------------------------------------------------------------------
    // Read-only queries (no wallet locks)
    // ------------------------------------------------------------------

    pub async fn wallet_view(&self, player_id: &str) -> WalletResult<WalletView> {
        let state = self.state.read().await;
        state
            .view(player_id)
            .ok_or_else(|| WalletError::WalletNotFound(player_id.to_string()))
    }

    /// Filtered journal entries, newest first.
    pub async fn transactions(&self, mut filter: JournalFilter) -> Vec<JournalEntry> {
        if filter.limit == 0 {
            filter.limit = DEFAULT_QUERY_LIMIT;
        }
        filter.limit = filter.limit.min(MAX_QUERY_LIMIT);

        let state = self.state.read().await;
        state.filtered_entries(&filter)
    }

    pub async fn stats(&self) -> ServiceStats {
        let state = self.state.read().await;
        let now = Utc::now();
        ServiceStats {
            total_wallets: state.wallet_count(),
            active_wallets: state.active_wallet_count(now),
            total_balance: state.total_balance(),
            total_frozen: state.total_frozen(),
            total_transactions: state.total_transactions,
            journal_entries: state.journal_entry_count(),
            created_at: state.created_at,
            last_updated: state.last_updated,
        }
    }

    pub async fn rake_stats(&self, period: RakePeriod) -> RakeStatsView {
        let state = self.state.read().await;
        let now = Utc::now();
        let stats = state.rake_stats(period, now);
        let average = if stats.hand_count > 0 {
            stats.total_rake as f64 / stats.hand_count as f64
        } else {
            0.0
        };
        RakeStatsView {
            period: match period {
                RakePeriod::Daily => "daily",
                RakePeriod::Monthly => "monthly",
                RakePeriod::Yearly => "yearly",
            }
            .to_string(),
            label: period.label(now),
            total_rake: stats.total_rake,
            hand_count: stats.hand_count,
            average_rake: average,
            last_updated: stats.last_updated,
        }
    }

    pub async fn health(&self) -> HealthSnapshot {
        let state = self.state.read().await;
        let now = Utc::now();
        HealthSnapshot {
            status: "ok",
            instance_id: self.instance_id.clone(),
            uptime_seconds: (now - state.created_at).num_seconds(),
            wallet_count: state.wallet_count(),
            journal_entries: state.journal_entry_count(),
            frozen_total: state.total_frozen(),
            total_transactions: state.total_transactions,
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Opportunistic GC run at the head of every mutating operation.
    fn sweep(&self, state: &mut ServiceState) -> DateTime<Utc> {
        let now = Utc::now();
        state.gc_daily_limits(now.date_naive());
        state.sweep_idempotency(now, self.config.idempotency_ttl);
        now
    }

    fn push(&self, state: &mut ServiceState, entry: JournalEntry) {
        state.push_entry(self.config.max_transactions_per_player, entry);
    }

    /// Apply a pre-validated balance delta. Callers must have planned the
    /// arithmetic (no overflow, no negative result) before mutating.
    fn apply_delta(
        &self,
        state: &mut ServiceState,
        player_id: &str,
        delta: i64,
        now: DateTime<Utc>,
    ) -> i64 {
        let wallet = state.get_or_create_wallet(
            player_id,
            self.config.default_initial_balance,
            &self.config.currency,
        );
        wallet.balance = wallet.balance.saturating_add(delta);
        wallet.last_updated = now;
        wallet.balance
    }

    /// Persist the snapshot; on failure restore the pre-image and surface
    /// an internal error.
    async fn commit(&self, state: &mut ServiceState, pre: PreImage) -> WalletResult<()> {
        match self.store.save(state).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("Snapshot write failed, rolling back in-memory mutation: {e}");
                pre.restore(state);
                Err(e.into())
            }
        }
    }
}

fn require_positive(amount: i64) -> WalletResult<i64> {
    if amount <= 0 {
        return Err(WalletError::InvalidAmount(amount));
    }
    Ok(amount)
}

fn require_id(field: &'static str, value: &str) -> WalletResult<()> {
    if value.trim().is_empty() {
        return Err(WalletError::InvalidField {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}

/// `min(floor(pot × pct / 100), maxRake)`, never negative.
fn compute_rake(pot_amount: i64, rake_percentage: f64, max_rake: i64) -> i64 {
    let raw = ((pot_amount as f64) * rake_percentage / 100.0).floor() as i64;
    raw.min(max_rake).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_rake_caps_at_max() {
        assert_eq!(compute_rake(100, 5.0, 3), 3);
        assert_eq!(compute_rake(100, 5.0, 50), 5);
        assert_eq!(compute_rake(1_000, 5.0, 50), 50);
    }

    #[test]
    fn test_compute_rake_floors() {
        assert_eq!(compute_rake(99, 5.0, 100), 4);
        assert_eq!(compute_rake(19, 5.0, 100), 0);
    }

    #[test]
    fn test_compute_rake_zero_percentage() {
        assert_eq!(compute_rake(1_000, 0.0, 50), 0);
    }

    #[test]
    fn test_require_positive() {
        assert!(require_positive(1).is_ok());
        assert!(require_positive(0).is_err());
        assert!(require_positive(-5).is_err());
    }

    #[test]
    fn test_require_id_rejects_blank() {
        assert!(require_id("playerId", "p1").is_ok());
        assert!(require_id("playerId", "").is_err());
        assert!(require_id("playerId", "   ").is_err());
    }
}
