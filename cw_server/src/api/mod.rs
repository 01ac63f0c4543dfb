//! HTTP API for the wallet shard.
//!
//! # Architecture
//!
//! The API is built with:
//! - **Axum**: async web framework routing each path+method to a typed handler
//! - **Tower**: CORS and middleware layers
//! - **Request IDs**: `x-request-id` correlation on every request
//!
//! # Endpoints Overview
//!
//! ```text
//! GET  /health                   - Liveness snapshot (public)
//! GET  /wallet?playerId=X        - Wallet view
//! POST /wallet/initialize        - Create wallet
//! POST /wallet/buy-in            - Freeze buy-in (Idempotency-Key honored)
//! POST /wallet/cash-out          - Settle seat
//! POST /wallet/process-winnings  - Hand settlement batch
//! POST /wallet/deposit           - Credit external funds
//! POST /wallet/withdraw          - Debit external funds
//! POST /wallet/transfer          - Peer-to-peer (Idempotency-Key honored)
//! POST /wallet/rollback-buy-in   - Release frozen funds
//! POST /wallet/rollback-hand     - Refund a voided hand
//! POST /wallet/collect-rake      - Rake + payout in one step
//! GET  /wallet/transactions      - Filtered journal
//! GET  /wallet/stats             - Aggregate stats
//! GET  /wallet/rake-stats        - Rake aggregates by period
//! ```
//!
//! Requests to a known path with the wrong method get `405` from the
//! router. All amounts are in the shard's minor unit.

pub mod error;
pub mod rate_limiter;
pub mod request_id;
pub mod wallet;

use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use chip_wallet::ledger::WalletService;
use chrono::Utc;
use rate_limiter::ErrorStormLimiter;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;

use crate::metrics;

/// Application state shared across all HTTP handlers.
///
/// Cloned per request (cheap due to Arc wrappers).
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WalletService>,
    pub error_storm: Arc<ErrorStormLimiter>,
}

impl AppState {
    pub fn new(service: Arc<WalletService>) -> Self {
        Self {
            service,
            error_storm: Arc::new(ErrorStormLimiter::for_error_logs()),
        }
    }
}

/// Create the complete API router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/wallet", get(wallet::get_wallet))
        .route("/wallet/initialize", post(wallet::initialize))
        .route("/wallet/buy-in", post(wallet::buy_in))
        .route("/wallet/cash-out", post(wallet::cash_out))
        .route("/wallet/process-winnings", post(wallet::process_winnings))
        .route("/wallet/deposit", post(wallet::deposit))
        .route("/wallet/withdraw", post(wallet::withdraw))
        .route("/wallet/transfer", post(wallet::transfer))
        .route("/wallet/rollback-buy-in", post(wallet::rollback_buy_in))
        .route("/wallet/rollback-hand", post(wallet::rollback_hand))
        .route("/wallet/collect-rake", post(wallet::collect_rake))
        .route("/wallet/transactions", get(wallet::get_transactions))
        .route("/wallet/stats", get(wallet::get_stats))
        .route("/wallet/rake-stats", get(wallet::get_rake_stats))
        .layer(axum::middleware::from_fn(track_http_metrics))
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Record request count and duration for every route.
async fn track_http_metrics(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    metrics::http_requests_total(&method, &path, response.status().as_u16());
    metrics::http_request_duration_ms(&method, &path, start.elapsed().as_secs_f64() * 1_000.0);
    response
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    instance_id: String,
    uptime_seconds: i64,
    wallet_count: usize,
    journal_entries: usize,
    frozen_total: i64,
    total_transactions: u64,
    response_time_ms: f64,
    timestamp: String,
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns a liveness snapshot with uptime, wallet and journal counts, the
/// frozen-chips total, the shard instance ID, and this probe's own
/// response time.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();
    let snapshot = state.service.health().await;

    metrics::wallet_count(snapshot.wallet_count);
    metrics::frozen_chips_total(snapshot.frozen_total);
    metrics::lock_steals_total(state.service.lock_steals());

    let response = HealthResponse {
        status: snapshot.status,
        instance_id: snapshot.instance_id,
        uptime_seconds: snapshot.uptime_seconds,
        wallet_count: snapshot.wallet_count,
        journal_entries: snapshot.journal_entries,
        frozen_total: snapshot.frozen_total,
        total_transactions: snapshot.total_transactions,
        response_time_ms: start.elapsed().as_secs_f64() * 1_000.0,
        timestamp: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(response))
}
