//! Wallet API handlers.
//!
//! One handler per endpoint: wallet views, buy-in/cash-out, hand
//! settlement, deposits/withdrawals, transfers, rollbacks, rake collection,
//! and the journal/stats queries. Handlers validate the wire payload,
//! delegate to [`WalletService`], and map errors through a single
//! status-mapping function.
//!
//! Buy-in and transfer honor the `Idempotency-Key` request header: a key
//! seen before replays the cached response byte-for-byte with
//! `X-Idempotent-Replayed: true` and produces no new side effect.

use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection, rejection::QueryRejection},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use chip_wallet::ledger::{
    BuyInRequest, CashOutRequest, CollectRakeRequest, DepositRequest, EntryKind,
    IdempotencyRecord, InitializeRequest, JournalFilter, ProcessWinningsRequest, RakePeriod,
    RollbackBuyInRequest, RollbackHandRequest, TransferRequest, WalletError, WithdrawRequest,
};
use serde::{Deserialize, Serialize};

use super::AppState;
use super::error::{Envelope, status_for};
use crate::metrics;

/// Request header enabling replay protection.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Response header marking a cached replay.
pub const REPLAYED_HEADER: &str = "x-idempotent-replayed";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletQuery {
    pub player_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsQuery {
    #[serde(default)]
    pub player_id: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub table_id: Option<String>,
    #[serde(default)]
    pub hand_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RakeStatsQuery {
    #[serde(default)]
    pub period: Option<String>,
}

/// Flat legacy response shape for buy-in.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FlatBuyIn {
    success: bool,
    chip_count: i64,
    wallet_balance: i64,
}

// ----------------------------------------------------------------------
// Response helpers
// ----------------------------------------------------------------------

fn ok_json<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(Envelope::ok(data))).into_response()
}

/// Response from a pre-serialized body, used on the idempotency paths where
/// replays must be byte-for-byte copies of the original.
fn raw_json(status: StatusCode, body: String, replayed: bool) -> Response {
    let mut response = (status, body).into_response();
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if replayed {
        response.headers_mut().insert(
            HeaderName::from_static(REPLAYED_HEADER),
            HeaderValue::from_static("true"),
        );
    }
    response
}

fn replay(record: IdempotencyRecord) -> Response {
    metrics::idempotent_replays_total();
    let status = StatusCode::from_u16(record.status).unwrap_or(StatusCode::OK);
    raw_json(status, record.body, true)
}

fn bad_request(message: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, Json(Envelope::err(message))).into_response()
}

fn reject_body(rejection: JsonRejection) -> Response {
    bad_request(format!("Invalid request body: {rejection}"))
}

fn reject_query(rejection: QueryRejection) -> Response {
    bad_request(format!("Invalid query: {rejection}"))
}

/// Map a service error onto the envelope, record metrics, and gate
/// error-level logging on internal faults.
fn fail(state: &AppState, op: &'static str, err: WalletError) -> Response {
    let status = status_for(&err);
    if err.is_internal() {
        metrics::wallet_operations_total(op, "failed");
        if matches!(err, WalletError::Store(_)) {
            metrics::snapshot_write_failures_total();
        }
        if state.error_storm.check(op) {
            tracing::error!(op, error = %err, "Wallet operation failed");
        }
    } else {
        metrics::wallet_operations_total(op, "rejected");
        tracing::debug!(op, error = %err, "Wallet operation rejected");
    }
    (status, Json(Envelope::err(err.to_string()))).into_response()
}

fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

// ----------------------------------------------------------------------
// Queries
// ----------------------------------------------------------------------

/// `GET /wallet?playerId=X` - balance, frozen, and available view.
pub async fn get_wallet(
    State(state): State<AppState>,
    query: Result<Query<WalletQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return reject_query(rejection),
    };

    match state.service.wallet_view(&query.player_id).await {
        Ok(view) => ok_json(view),
        Err(err) => fail(&state, "get_wallet", err),
    }
}

/// `GET /wallet/transactions` - filtered journal entries, newest first.
pub async fn get_transactions(
    State(state): State<AppState>,
    query: Result<Query<TransactionsQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return reject_query(rejection),
    };

    let kind = match query.kind.as_deref() {
        None => None,
        Some(raw) => match raw.parse::<EntryKind>() {
            Ok(kind) => Some(kind),
            Err(()) => return bad_request(format!("Unknown transaction kind: {raw}")),
        },
    };

    let entries = state
        .service
        .transactions(JournalFilter {
            player_id: query.player_id,
            kind,
            table_id: query.table_id,
            hand_id: query.hand_id,
            limit: query.limit.unwrap_or(0),
        })
        .await;

    let count = entries.len();
    ok_json(serde_json::json!({ "transactions": entries, "count": count }))
}

/// `GET /wallet/stats` - aggregate counts and totals.
pub async fn get_stats(State(state): State<AppState>) -> Response {
    let stats = state.service.stats().await;
    metrics::wallet_count(stats.total_wallets);
    metrics::frozen_chips_total(stats.total_frozen);
    metrics::lock_steals_total(state.service.lock_steals());
    ok_json(stats)
}

/// `GET /wallet/rake-stats?period=daily|monthly|yearly` - rake aggregates.
pub async fn get_rake_stats(
    State(state): State<AppState>,
    query: Result<Query<RakeStatsQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return reject_query(rejection),
    };

    let period = match query.period.as_deref() {
        None => RakePeriod::Daily,
        Some(raw) => match raw.parse::<RakePeriod>() {
            Ok(period) => period,
            Err(()) => {
                return bad_request(format!(
                    "Unknown period '{raw}': expected daily, monthly, or yearly"
                ));
            }
        },
    };

    ok_json(state.service.rake_stats(period).await)
}

// ----------------------------------------------------------------------
// Mutations
// ----------------------------------------------------------------------

/// `POST /wallet/initialize` - explicitly create a wallet.
pub async fn initialize(
    State(state): State<AppState>,
    payload: Result<Json<InitializeRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return reject_body(rejection),
    };

    match state.service.initialize(req).await {
        Ok(view) => {
            metrics::wallet_operations_total("initialize", "ok");
            ok_json(view)
        }
        Err(err) => fail(&state, "initialize", err),
    }
}

/// `POST /wallet/buy-in` - freeze a buy-in against a seat.
///
/// Returns the flat legacy shape `{ success, chipCount, walletBalance }`
/// and honors `Idempotency-Key`.
pub async fn buy_in(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<BuyInRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return reject_body(rejection),
    };

    let key = idempotency_key(&headers);
    if let Some(key) = &key {
        if let Some(record) = state.service.idempotency_lookup(key).await {
            return replay(record);
        }
    }

    match state.service.buy_in(req).await {
        Ok(receipt) => {
            metrics::wallet_operations_total("buy_in", "ok");
            let body = serde_json::to_string(&FlatBuyIn {
                success: true,
                chip_count: receipt.chip_count,
                wallet_balance: receipt.wallet_balance,
            })
            .unwrap_or_else(|_| r#"{"success":true}"#.to_string());

            if let Some(key) = key {
                state
                    .service
                    .idempotency_store(&key, StatusCode::OK.as_u16(), body.clone())
                    .await;
            }

            raw_json(StatusCode::OK, body, false)
        }
        Err(err) => fail(&state, "buy_in", err),
    }
}

/// `POST /wallet/cash-out` - settle a seat.
pub async fn cash_out(
    State(state): State<AppState>,
    payload: Result<Json<CashOutRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return reject_body(rejection),
    };

    match state.service.cash_out(req).await {
        Ok(receipt) => {
            metrics::wallet_operations_total("cash_out", "ok");
            ok_json(receipt)
        }
        Err(err) => fail(&state, "cash_out", err),
    }
}

/// `POST /wallet/process-winnings` - settle one hand for all participants.
pub async fn process_winnings(
    State(state): State<AppState>,
    payload: Result<Json<ProcessWinningsRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return reject_body(rejection),
    };

    match state.service.process_winnings(req).await {
        Ok(receipt) => {
            metrics::wallet_operations_total("process_winnings", "ok");
            ok_json(receipt)
        }
        Err(err) => fail(&state, "process_winnings", err),
    }
}

/// `POST /wallet/deposit` - credit external funds.
pub async fn deposit(
    State(state): State<AppState>,
    payload: Result<Json<DepositRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return reject_body(rejection),
    };

    match state.service.deposit(req).await {
        Ok(receipt) => {
            metrics::wallet_operations_total("deposit", "ok");
            ok_json(receipt)
        }
        Err(err) => fail(&state, "deposit", err),
    }
}

/// `POST /wallet/withdraw` - debit external funds.
pub async fn withdraw(
    State(state): State<AppState>,
    payload: Result<Json<WithdrawRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return reject_body(rejection),
    };

    match state.service.withdraw(req).await {
        Ok(receipt) => {
            metrics::wallet_operations_total("withdraw", "ok");
            ok_json(receipt)
        }
        Err(err) => fail(&state, "withdraw", err),
    }
}

/// `POST /wallet/transfer` - peer-to-peer transfer; honors
/// `Idempotency-Key`.
pub async fn transfer(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return reject_body(rejection),
    };

    let key = idempotency_key(&headers);
    if let Some(key) = &key {
        if let Some(record) = state.service.idempotency_lookup(key).await {
            return replay(record);
        }
    }

    match state.service.transfer(req).await {
        Ok(receipt) => {
            metrics::wallet_operations_total("transfer", "ok");
            let body = serde_json::to_string(&Envelope::ok(&receipt))
                .unwrap_or_else(|_| r#"{"success":true}"#.to_string());

            if let Some(key) = key {
                state
                    .service
                    .idempotency_store(&key, StatusCode::OK.as_u16(), body.clone())
                    .await;
            }

            raw_json(StatusCode::OK, body, false)
        }
        Err(err) => fail(&state, "transfer", err),
    }
}

/// `POST /wallet/rollback-buy-in` - release frozen funds back to available.
pub async fn rollback_buy_in(
    State(state): State<AppState>,
    payload: Result<Json<RollbackBuyInRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return reject_body(rejection),
    };

    match state.service.rollback_buy_in(req).await {
        Ok(receipt) => {
            metrics::wallet_operations_total("rollback_buy_in", "ok");
            ok_json(receipt)
        }
        Err(err) => fail(&state, "rollback_buy_in", err),
    }
}

/// `POST /wallet/rollback-hand` - refund a voided hand.
pub async fn rollback_hand(
    State(state): State<AppState>,
    payload: Result<Json<RollbackHandRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return reject_body(rejection),
    };

    match state.service.rollback_hand(req).await {
        Ok(receipt) => {
            metrics::wallet_operations_total("rollback_hand", "ok");
            ok_json(receipt)
        }
        Err(err) => fail(&state, "rollback_hand", err),
    }
}

/// `POST /wallet/collect-rake` - extract rake and pay out the pot.
pub async fn collect_rake(
    State(state): State<AppState>,
    payload: Result<Json<CollectRakeRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return reject_body(rejection),
    };

    match state.service.collect_rake(req).await {
        Ok(receipt) => {
            metrics::wallet_operations_total("collect_rake", "ok");
            metrics::rake_collected(receipt.rake);
            ok_json(receipt)
        }
        Err(err) => fail(&state, "collect_rake", err),
    }
}
