//! Error types for the bridge engine.
//!
//! Errors fall into three groups, and the reducer treats them differently:
//! configuration/lookup errors are fatal for the call, step rejections are
//! recovered into the step's reject state, everything else propagates.

use thiserror::Error;

/// Bridge engine error.
///
/// Payloads are strings so the error is `Clone`; a pending outcome is shared
/// between concurrent callers of the same transaction id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// Transaction id unknown to the store.
    #[error("Transaction not found: {0}")]
    NotFound(String),

    /// No reducer registered for a transaction type.
    #[error("No reducer registered for transaction type: {0}")]
    NoReducer(String),

    /// Malformed boundary table, transition table or engine config.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid transfer request.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The user (or signer) declined the signature.
    #[error("Signature rejected: {0}")]
    SignatureRejected(String),

    /// Chain RPC call failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// A polling step gave up.
    #[error("Timed out waiting for {what} after {attempts} attempts")]
    Timeout { what: String, attempts: usize },

    /// Observed chain state contradicts the persisted record.
    #[error("Reconciliation mismatch: {0}")]
    Reconciliation(String),

    /// The chain reported the leg as failed.
    #[error("Rejected by chain: {0}")]
    Rejected(String),

    /// Transaction store failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Engine shut down while a step was polling.
    #[error("Operation cancelled")]
    Cancelled,

    /// Anything else.
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    /// Errors a step handler may raise that the reducer turns into the step's
    /// reject state instead of propagating.
    pub fn is_step_rejection(&self) -> bool {
        matches!(
            self,
            Self::SignatureRejected(_)
                | Self::Rpc(_)
                | Self::Timeout { .. }
                | Self::Reconciliation(_)
                | Self::Rejected(_)
        )
    }

    /// A user-initiated re-`process` may succeed after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Cancelled | Self::Rpc(_) | Self::Timeout { .. })
    }

    /// Fatal: re-invoking with the same arguments cannot succeed.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::NoReducer(_) | Self::Configuration(_))
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Storage(err.to_string())
    }
}

impl From<sqlx::Error> for BridgeError {
    fn from(err: sqlx::Error) -> Self {
        BridgeError::Storage(err.to_string())
    }
}

impl From<tokio::task::JoinError> for BridgeError {
    fn from(err: tokio::task::JoinError) -> Self {
        BridgeError::Internal(format!("driver task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_not_found() {
        let err = BridgeError::NotFound("abc".to_string());
        assert_eq!(err.to_string(), "Transaction not found: abc");
    }

    #[test]
    fn test_display_timeout() {
        let err = BridgeError::Timeout { what: "SORA finality".to_string(), attempts: 3 };
        assert_eq!(err.to_string(), "Timed out waiting for SORA finality after 3 attempts");
    }

    #[test]
    fn test_step_rejection_classification() {
        assert!(BridgeError::SignatureRejected("user".into()).is_step_rejection());
        assert!(BridgeError::Reconciliation("dropped".into()).is_step_rejection());
        assert!(!BridgeError::Storage("disk".into()).is_step_rejection());
        assert!(!BridgeError::Cancelled.is_step_rejection());
        assert!(!BridgeError::NotFound("x".into()).is_step_rejection());
    }

    #[test]
    fn test_critical_errors() {
        assert!(BridgeError::NoReducer("EvmOutgoing".into()).is_critical());
        assert!(!BridgeError::Cancelled.is_critical());
        assert!(BridgeError::Cancelled.is_retryable());
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: BridgeError = io.into();
        assert_eq!(err, BridgeError::Storage("boom".to_string()));
    }
}
