//! Response envelope and error-to-status mapping.
//!
//! Every non-health endpoint answers with `{ success, data?, error? }`;
//! buy-in keeps its flat legacy shape. Library errors map onto HTTP status
//! codes in exactly one place so the taxonomy stays consistent across
//! handlers.

use axum::http::StatusCode;
use chip_wallet::ledger::WalletError;
use serde::Serialize;

/// Standard response envelope.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl Envelope<()> {
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// HTTP status for a wallet error.
///
/// Validation, policy, and conflict errors are client faults (400); a
/// missing wallet is 404; lock timeouts and snapshot failures are internal
/// (500).
pub fn status_for(err: &WalletError) -> StatusCode {
    match err {
        WalletError::WalletNotFound(_) => StatusCode::NOT_FOUND,
        WalletError::LockTimeout(_) | WalletError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        WalletError::InvalidAmount(_)
        | WalletError::InvalidField { .. }
        | WalletError::SelfTransfer(_)
        | WalletError::TransferOutOfRange { .. }
        | WalletError::WalletExists(_)
        | WalletError::SeatOccupied { .. }
        | WalletError::NoFrozenFunds { .. }
        | WalletError::InsufficientBalance { .. }
        | WalletError::DailyLimitExceeded { .. }
        | WalletError::BalanceOverflow(_) => StatusCode::BAD_REQUEST,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&WalletError::WalletNotFound("p1".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&WalletError::WalletExists("p1".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&WalletError::InsufficientBalance {
                available: 1,
                required: 2
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&WalletError::LockTimeout("p1".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_envelope_shapes() {
        let ok = serde_json::to_value(Envelope::ok(serde_json::json!({"a": 1}))).unwrap();
        assert_eq!(ok["success"], true);
        assert!(ok.get("error").is_none());

        let err = serde_json::to_value(Envelope::err("nope")).unwrap();
        assert_eq!(err["success"], false);
        assert_eq!(err["error"], "nope");
        assert!(err.get("data").is_none());
    }
}
