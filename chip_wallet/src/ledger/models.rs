//! Ledger data models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Player ID type (opaque string identifier)
pub type PlayerId = String;

/// Table ID type
pub type TableId = String;

/// Reserved player ID for the rake sink wallet.
pub const HOUSE_PLAYER_ID: &str = "house";

/// Wallet model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub player_id: PlayerId,
    pub balance: i64,
    pub currency: String,
    pub last_updated: DateTime<Utc>,
}

/// Escrow entry tying frozen chips to a seat at a table.
///
/// Frozen chips stay inside the wallet balance; they are excluded from the
/// available balance until cash-out or rollback releases them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrozenEntry {
    pub id: Uuid,
    pub player_id: PlayerId,
    pub table_id: TableId,
    pub amount: i64,
    pub frozen_at: DateTime<Utc>,
    pub reason: FreezeReason,
}

/// Why chips were frozen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreezeReason {
    BuyIn,
}

impl std::fmt::Display for FreezeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FreezeReason::BuyIn => write!(f, "buy_in"),
        }
    }
}

/// Journal entry model (per-wallet money-movement record)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: Uuid,
    pub player_id: PlayerId,
    pub kind: EntryKind,
    /// Signed amount: credit positive, debit negative.
    pub amount: i64,
    /// Wallet balance immediately after this entry was applied.
    pub post_balance: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_id: Option<TableId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hand_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_player_id: Option<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

/// Journal entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    BuyIn,
    CashOut,
    Win,
    Loss,
    Deposit,
    Withdrawal,
    Transfer,
    Refund,
    Rake,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::BuyIn => write!(f, "buy_in"),
            EntryKind::CashOut => write!(f, "cash_out"),
            EntryKind::Win => write!(f, "win"),
            EntryKind::Loss => write!(f, "loss"),
            EntryKind::Deposit => write!(f, "deposit"),
            EntryKind::Withdrawal => write!(f, "withdrawal"),
            EntryKind::Transfer => write!(f, "transfer"),
            EntryKind::Refund => write!(f, "refund"),
            EntryKind::Rake => write!(f, "rake"),
        }
    }
}

impl std::str::FromStr for EntryKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy_in" => Ok(EntryKind::BuyIn),
            "cash_out" => Ok(EntryKind::CashOut),
            "win" => Ok(EntryKind::Win),
            "loss" => Ok(EntryKind::Loss),
            "deposit" => Ok(EntryKind::Deposit),
            "withdrawal" => Ok(EntryKind::Withdrawal),
            "transfer" => Ok(EntryKind::Transfer),
            "refund" => Ok(EntryKind::Refund),
            "rake" => Ok(EntryKind::Rake),
            _ => Err(()),
        }
    }
}

/// Running totals for one `(player, local date)` pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyTotals {
    #[serde(default)]
    pub deposits: i64,
    #[serde(default)]
    pub withdrawals: i64,
    #[serde(default)]
    pub buy_ins: i64,
}

impl DailyTotals {
    /// Composite map key for a player/date pair.
    pub fn key(player_id: &str, date: NaiveDate) -> String {
        format!("{player_id}:{date}")
    }

    /// Parse the date component back out of a composite key.
    pub fn date_of_key(key: &str) -> Option<NaiveDate> {
        key.rsplit_once(':')
            .and_then(|(_, date)| date.parse().ok())
    }
}

/// Cached response for an idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub body: String,
    pub status: u16,
    pub created_at: DateTime<Utc>,
}

/// Rolling rake totals for one period label.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RakeStats {
    #[serde(default)]
    pub total_rake: i64,
    #[serde(default)]
    pub hand_count: u64,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Rake aggregation period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RakePeriod {
    Daily,
    Monthly,
    Yearly,
}

impl RakePeriod {
    /// Period label for a timestamp, e.g. `2026-08-01`, `2026-08`, `2026`.
    pub fn label(&self, at: DateTime<Utc>) -> String {
        match self {
            RakePeriod::Daily => at.format("%Y-%m-%d").to_string(),
            RakePeriod::Monthly => at.format("%Y-%m").to_string(),
            RakePeriod::Yearly => at.format("%Y").to_string(),
        }
    }

    pub const ALL: [RakePeriod; 3] = [RakePeriod::Daily, RakePeriod::Monthly, RakePeriod::Yearly];
}

impl std::str::FromStr for RakePeriod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(RakePeriod::Daily),
            "monthly" => Ok(RakePeriod::Monthly),
            "yearly" => Ok(RakePeriod::Yearly),
            _ => Err(()),
        }
    }
}

/// Balance view for one wallet: raw balance, frozen chips, and what is
/// actually spendable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletView {
    pub player_id: PlayerId,
    pub balance: i64,
    pub frozen: i64,
    pub available: i64,
    pub currency: String,
    pub last_updated: DateTime<Utc>,
}

/// One winner's share of a settled pot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinnerStake {
    pub player_id: PlayerId,
    pub amount: i64,
}

/// One winner's fractional share of a raked pot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinnerShare {
    pub player_id: PlayerId,
    pub share: f64,
}

/// One player's refund in a voided hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandRefund {
    pub player_id: PlayerId,
    pub refund_amount: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_entry_kind_roundtrip() {
        for kind in [
            EntryKind::BuyIn,
            EntryKind::CashOut,
            EntryKind::Win,
            EntryKind::Loss,
            EntryKind::Deposit,
            EntryKind::Withdrawal,
            EntryKind::Transfer,
            EntryKind::Refund,
            EntryKind::Rake,
        ] {
            let parsed: EntryKind = kind.to_string().parse().expect("should parse");
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_entry_kind_rejects_unknown() {
        assert!("jackpot".parse::<EntryKind>().is_err());
        assert!("".parse::<EntryKind>().is_err());
    }

    #[test]
    fn test_rake_period_labels() {
        let at = Utc.with_ymd_and_hms(2026, 8, 1, 12, 30, 0).unwrap();
        assert_eq!(RakePeriod::Daily.label(at), "2026-08-01");
        assert_eq!(RakePeriod::Monthly.label(at), "2026-08");
        assert_eq!(RakePeriod::Yearly.label(at), "2026");
    }

    #[test]
    fn test_daily_totals_key_roundtrip() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let key = DailyTotals::key("p1", date);
        assert_eq!(key, "p1:2026-08-01");
        assert_eq!(DailyTotals::date_of_key(&key), Some(date));
    }

    #[test]
    fn test_daily_totals_key_with_colon_in_player_id() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let key = DailyTotals::key("region:p1", date);
        assert_eq!(DailyTotals::date_of_key(&key), Some(date));
    }

    #[test]
    fn test_journal_entry_tolerates_missing_optional_fields() {
        // Snapshots written by older builds may omit optional columns.
        let raw = serde_json::json!({
            "id": Uuid::new_v4(),
            "player_id": "p1",
            "kind": "deposit",
            "amount": 100,
            "post_balance": 100,
            "timestamp": Utc::now(),
        });
        let entry: JournalEntry = serde_json::from_value(raw).expect("should deserialize");
        assert!(entry.table_id.is_none());
        assert!(entry.metadata.is_none());
    }
}
