//! The full service state: wallets, journals, frozen funds, daily limits,
//! idempotency cache, and rake aggregates.
//!
//! `ServiceState` is the atomic snapshot unit. Every mutating operation
//! applies its changes here and then persists the whole structure through a
//! [`SnapshotStore`](crate::store::SnapshotStore); a crash after any request
//! recovers to the last committed snapshot.

use super::errors::{WalletError, WalletResult};
use super::models::{
    DailyTotals, EntryKind, FreezeReason, FrozenEntry, IdempotencyRecord, JournalEntry, RakePeriod,
    RakeStats, Wallet, WalletView,
};
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use uuid::Uuid;

/// Daily-limit rows older than this many local days are garbage-collected.
const DAILY_LIMIT_RETENTION_DAYS: u64 = 7;

/// Complete wallet shard state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceState {
    #[serde(default)]
    wallets: HashMap<String, Wallet>,
    #[serde(default)]
    journals: HashMap<String, VecDeque<JournalEntry>>,
    #[serde(default)]
    frozen: HashMap<String, Vec<FrozenEntry>>,
    #[serde(default)]
    daily_limits: HashMap<String, DailyTotals>,
    #[serde(default)]
    idempotency: HashMap<String, IdempotencyRecord>,
    #[serde(default)]
    rake_stats: HashMap<String, RakeStats>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub total_transactions: u64,
}

impl Default for ServiceState {
    fn default() -> Self {
        Self::new()
    }
}

/// Filter for journal queries.
#[derive(Debug, Clone, Default)]
pub struct JournalFilter {
    pub player_id: Option<String>,
    pub kind: Option<EntryKind>,
    pub table_id: Option<String>,
    pub hand_id: Option<String>,
    pub limit: usize,
}

impl ServiceState {
    /// Empty initial state (used when no snapshot exists yet).
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            wallets: HashMap::new(),
            journals: HashMap::new(),
            frozen: HashMap::new(),
            daily_limits: HashMap::new(),
            idempotency: HashMap::new(),
            rake_stats: HashMap::new(),
            created_at: now,
            last_updated: now,
            total_transactions: 0,
        }
    }

    // ------------------------------------------------------------------
    // Wallet registry
    // ------------------------------------------------------------------

    pub fn wallet(&self, player_id: &str) -> Option<&Wallet> {
        self.wallets.get(player_id)
    }

    pub fn wallet_mut(&mut self, player_id: &str) -> Option<&mut Wallet> {
        self.wallets.get_mut(player_id)
    }

    pub fn wallet_count(&self) -> usize {
        self.wallets.len()
    }

    /// Explicitly create a wallet.
    ///
    /// Appends the synthetic initial-balance `deposit` journal entry when
    /// the starting balance is positive.
    ///
    /// # Errors
    ///
    /// * `WalletError::WalletExists` - a wallet for this player already exists
    /// * `WalletError::InvalidAmount` - negative initial balance
    pub fn create_wallet(
        &mut self,
        player_id: &str,
        initial_balance: i64,
        currency: &str,
    ) -> WalletResult<&Wallet> {
        if initial_balance < 0 {
            return Err(WalletError::InvalidAmount(initial_balance));
        }
        if self.wallets.contains_key(player_id) {
            return Err(WalletError::WalletExists(player_id.to_string()));
        }

        let now = Utc::now();
        self.wallets.insert(
            player_id.to_string(),
            Wallet {
                player_id: player_id.to_string(),
                balance: initial_balance,
                currency: currency.to_string(),
                last_updated: now,
            },
        );

        if initial_balance > 0 {
            let entry = JournalEntry {
                id: Uuid::new_v4(),
                player_id: player_id.to_string(),
                kind: EntryKind::Deposit,
                amount: initial_balance,
                post_balance: initial_balance,
                table_id: None,
                hand_id: None,
                related_player_id: None,
                description: Some("Initial balance".to_string()),
                metadata: None,
                timestamp: now,
            };
            self.journals
                .entry(player_id.to_string())
                .or_default()
                .push_back(entry);
            self.total_transactions += 1;
        }

        self.last_updated = now;
        Ok(&self.wallets[player_id])
    }

    /// Return the wallet, creating it with the given starting balance if the
    /// player has never been seen before.
    pub fn get_or_create_wallet(
        &mut self,
        player_id: &str,
        initial_balance: i64,
        currency: &str,
    ) -> &mut Wallet {
        if !self.wallets.contains_key(player_id) {
            // Cannot fail: the wallet is absent and the balance non-negative.
            let _ = self.create_wallet(player_id, initial_balance.max(0), currency);
        }
        self.wallets
            .get_mut(player_id)
            .expect("wallet just ensured")
    }

    /// Balance view for one wallet.
    pub fn view(&self, player_id: &str) -> Option<WalletView> {
        let wallet = self.wallets.get(player_id)?;
        let frozen = self.frozen_sum(player_id);
        Some(WalletView {
            player_id: wallet.player_id.clone(),
            balance: wallet.balance,
            frozen,
            available: wallet.balance - frozen,
            currency: wallet.currency.clone(),
            last_updated: wallet.last_updated,
        })
    }

    pub fn total_balance(&self) -> i64 {
        self.wallets.values().map(|w| w.balance).sum()
    }

    // ------------------------------------------------------------------
    // Frozen funds
    // ------------------------------------------------------------------

    pub fn frozen_sum(&self, player_id: &str) -> i64 {
        self.frozen
            .get(player_id)
            .map(|entries| entries.iter().map(|e| e.amount).sum())
            .unwrap_or(0)
    }

    /// Spendable balance: wallet balance minus frozen chips. Zero for an
    /// unknown player.
    pub fn available(&self, player_id: &str) -> i64 {
        self.wallets
            .get(player_id)
            .map(|w| w.balance - self.frozen_sum(player_id))
            .unwrap_or(0)
    }

    pub fn has_frozen(&self, player_id: &str, table_id: &str) -> bool {
        self.frozen
            .get(player_id)
            .is_some_and(|entries| entries.iter().any(|e| e.table_id == table_id))
    }

    pub fn total_frozen(&self) -> i64 {
        self.frozen
            .values()
            .flat_map(|entries| entries.iter())
            .map(|e| e.amount)
            .sum()
    }

    pub fn frozen_entry_count(&self) -> usize {
        self.frozen.values().map(Vec::len).sum()
    }

    /// Add an escrow entry. Callers must have already validated available
    /// balance and seat uniqueness under the wallet lock.
    pub fn freeze(&mut self, player_id: &str, table_id: &str, amount: i64, reason: FreezeReason) {
        self.frozen
            .entry(player_id.to_string())
            .or_default()
            .push(FrozenEntry {
                id: Uuid::new_v4(),
                player_id: player_id.to_string(),
                table_id: table_id.to_string(),
                amount,
                frozen_at: Utc::now(),
                reason,
            });
    }

    /// Remove and return the first frozen entry for `(player, table)`.
    pub fn release_frozen(&mut self, player_id: &str, table_id: &str) -> Option<FrozenEntry> {
        let entries = self.frozen.get_mut(player_id)?;
        let idx = entries.iter().position(|e| e.table_id == table_id)?;
        let entry = entries.remove(idx);
        if entries.is_empty() {
            self.frozen.remove(player_id);
        }
        Some(entry)
    }

    // ------------------------------------------------------------------
    // Journal
    // ------------------------------------------------------------------

    /// Append a journal entry, evicting the oldest entries beyond `cap`.
    ///
    /// Eviction never rewrites `post_balance` of the remaining entries; the
    /// wallet balance stays authoritative independent of journal contents.
    pub fn push_entry(&mut self, cap: usize, entry: JournalEntry) {
        let now = entry.timestamp;
        let journal = self.journals.entry(entry.player_id.clone()).or_default();
        journal.push_back(entry);
        while journal.len() > cap {
            journal.pop_front();
        }
        self.total_transactions += 1;
        self.last_updated = now;
    }

    pub fn journal(&self, player_id: &str) -> Option<&VecDeque<JournalEntry>> {
        self.journals.get(player_id)
    }

    pub fn journal_entry_count(&self) -> usize {
        self.journals.values().map(VecDeque::len).sum()
    }

    /// Wallets with at least one journal entry in the trailing 24 hours.
    pub fn active_wallet_count(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - chrono::Duration::hours(24);
        self.journals
            .values()
            .filter(|journal| journal.back().is_some_and(|e| e.timestamp >= cutoff))
            .count()
    }

    /// Filtered journal entries, newest first, bounded by `filter.limit`.
    pub fn filtered_entries(&self, filter: &JournalFilter) -> Vec<JournalEntry> {
        let mut entries: Vec<JournalEntry> = match &filter.player_id {
            Some(player_id) => self
                .journals
                .get(player_id)
                .map(|j| j.iter().cloned().collect())
                .unwrap_or_default(),
            None => self
                .journals
                .values()
                .flat_map(|j| j.iter().cloned())
                .collect(),
        };

        entries.retain(|e| {
            filter.kind.is_none_or(|kind| e.kind == kind)
                && filter
                    .table_id
                    .as_ref()
                    .is_none_or(|t| e.table_id.as_deref() == Some(t.as_str()))
                && filter
                    .hand_id
                    .as_ref()
                    .is_none_or(|h| e.hand_id.as_deref() == Some(h.as_str()))
        });

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(filter.limit);
        entries
    }

    // ------------------------------------------------------------------
    // Daily limits
    // ------------------------------------------------------------------

    pub fn daily_totals(&self, player_id: &str, date: NaiveDate) -> DailyTotals {
        self.daily_limits
            .get(&DailyTotals::key(player_id, date))
            .cloned()
            .unwrap_or_default()
    }

    pub fn daily_totals_mut(&mut self, player_id: &str, date: NaiveDate) -> &mut DailyTotals {
        self.daily_limits
            .entry(DailyTotals::key(player_id, date))
            .or_default()
    }

    /// Drop daily-limit rows older than the retention window.
    pub fn gc_daily_limits(&mut self, today: NaiveDate) {
        let cutoff = today
            .checked_sub_days(Days::new(DAILY_LIMIT_RETENTION_DAYS))
            .unwrap_or(today);
        self.daily_limits.retain(|key, _| {
            DailyTotals::date_of_key(key).is_none_or(|date| date >= cutoff)
        });
    }

    // ------------------------------------------------------------------
    // Idempotency cache
    // ------------------------------------------------------------------

    /// Cached response for a key, if present and not expired.
    pub fn idempotency_get(
        &self,
        key: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Option<&IdempotencyRecord> {
        let record = self.idempotency.get(key)?;
        let age = now.signed_duration_since(record.created_at);
        (age.to_std().is_ok_and(|age| age <= ttl)).then_some(record)
    }

    pub fn idempotency_put(&mut self, key: &str, record: IdempotencyRecord) {
        self.idempotency.insert(key.to_string(), record);
    }

    /// Evict expired idempotency records.
    pub fn sweep_idempotency(&mut self, now: DateTime<Utc>, ttl: Duration) {
        self.idempotency.retain(|_, record| {
            now.signed_duration_since(record.created_at)
                .to_std()
                .is_ok_and(|age| age <= ttl)
        });
    }

    #[cfg(test)]
    pub(crate) fn idempotency_len(&self) -> usize {
        self.idempotency.len()
    }

    // ------------------------------------------------------------------
    // Rake aggregates
    // ------------------------------------------------------------------

    /// Record one raked hand against the daily, monthly, and yearly periods.
    pub fn record_rake(&mut self, rake: i64, at: DateTime<Utc>) {
        for period in RakePeriod::ALL {
            let stats = self.rake_stats.entry(period.label(at)).or_default();
            stats.total_rake += rake;
            stats.hand_count += 1;
            stats.last_updated = Some(at);
        }
    }

    /// Rolling totals for the period containing `at`.
    pub fn rake_stats(&self, period: RakePeriod, at: DateTime<Utc>) -> RakeStats {
        self.rake_stats
            .get(&period.label(at))
            .cloned()
            .unwrap_or_default()
    }
}

/// Pre-image of the substructures one operation is about to mutate.
///
/// Captured under the wallet lock before applying a mutation; if the
/// snapshot write fails, `restore` puts the captured rows back under the
/// same lock so the in-memory state never diverges from the last committed
/// snapshot.
#[derive(Debug)]
pub struct PreImage {
    wallets: Vec<(String, Option<Wallet>)>,
    journals: Vec<(String, Option<VecDeque<JournalEntry>>)>,
    frozen: Vec<(String, Option<Vec<FrozenEntry>>)>,
    daily: Vec<(String, Option<DailyTotals>)>,
    rake: Vec<(String, Option<RakeStats>)>,
    total_transactions: u64,
    last_updated: DateTime<Utc>,
}

impl PreImage {
    /// Capture the rows of the given players (plus the global counters and
    /// the current rake periods) ahead of a mutation.
    pub fn capture<S: AsRef<str>>(state: &ServiceState, players: &[S], at: DateTime<Utc>) -> Self {
        let date = at.date_naive();
        let mut wallets = Vec::with_capacity(players.len());
        let mut journals = Vec::with_capacity(players.len());
        let mut frozen = Vec::with_capacity(players.len());
        let mut daily = Vec::with_capacity(players.len());

        for player in players {
            let player = player.as_ref();
            wallets.push((player.to_string(), state.wallets.get(player).cloned()));
            journals.push((player.to_string(), state.journals.get(player).cloned()));
            frozen.push((player.to_string(), state.frozen.get(player).cloned()));
            let daily_key = DailyTotals::key(player, date);
            daily.push((daily_key.clone(), state.daily_limits.get(&daily_key).cloned()));
        }

        let rake = RakePeriod::ALL
            .iter()
            .map(|period| {
                let label = period.label(at);
                let stats = state.rake_stats.get(&label).cloned();
                (label, stats)
            })
            .collect();

        Self {
            wallets,
            journals,
            frozen,
            daily,
            rake,
            total_transactions: state.total_transactions,
            last_updated: state.last_updated,
        }
    }

    /// Restore the captured rows, undoing the failed mutation.
    pub fn restore(self, state: &mut ServiceState) {
        fn put_back<V>(map: &mut HashMap<String, V>, rows: Vec<(String, Option<V>)>) {
            for (key, value) in rows {
                match value {
                    Some(value) => {
                        map.insert(key, value);
                    }
                    None => {
                        map.remove(&key);
                    }
                }
            }
        }

        put_back(&mut state.wallets, self.wallets);
        put_back(&mut state.journals, self.journals);
        put_back(&mut state.frozen, self.frozen);
        put_back(&mut state.daily_limits, self.daily);
        put_back(&mut state.rake_stats, self.rake);
        state.total_transactions = self.total_transactions;
        state.last_updated = self.last_updated;
    }
}
