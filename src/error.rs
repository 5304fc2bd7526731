//! Error types for the swap coordinator

use thiserror::Error;

/// Main error type for the coordinator
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Invalid secret count: {count}")]
    InvalidSecretCount { count: usize },

    #[error("Preset {preset} is not offered by quote {quote_id}")]
    PresetUnavailable { preset: String, quote_id: String },

    #[error("Secret {index} of swap {swap_id} requested before its fill was ready")]
    PrematureRelease { swap_id: String, index: u32 },

    #[error("Order submission rejected: {0}")]
    SubmissionRejected(String),

    #[error("Escrow monitor unavailable for order {order_hash} after {attempts} attempts: {message}")]
    MonitorUnavailable {
        order_hash: String,
        attempts: u32,
        message: String,
    },

    #[error("Order {order_hash} is locked by {reported}, expected {expected}")]
    HashLockMismatch {
        order_hash: String,
        expected: String,
        reported: String,
    },

    #[error("Ledger inconsistency for swap {swap_id}: {message}")]
    LedgerInconsistency { swap_id: String, message: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Order book error: {0}")]
    OrderBook(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Swap {0} not found")]
    NotFound(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Swap {0} was cancelled")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoordinatorError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoordinatorError::MonitorUnavailable { .. } | CoordinatorError::OrderBook(_)
        )
    }

    /// Errors that must stop all further work on a swap until an operator
    /// looks at it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoordinatorError::LedgerInconsistency { .. })
    }

    /// Structural violations that abort the current transition and fail the
    /// swap.
    pub fn fails_swap(&self) -> bool {
        matches!(
            self,
            CoordinatorError::InvalidSecretCount { .. }
                | CoordinatorError::PresetUnavailable { .. }
                | CoordinatorError::PrematureRelease { .. }
                | CoordinatorError::SubmissionRejected(_)
                | CoordinatorError::HashLockMismatch { .. }
        )
    }
}

impl From<serde_json::Error> for CoordinatorError {
    fn from(err: serde_json::Error) -> Self {
        CoordinatorError::Internal(err.to_string())
    }
}

/// Result type for coordinator operations
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let transient = CoordinatorError::MonitorUnavailable {
            order_hash: "0xabc".to_string(),
            attempts: 3,
            message: "timeout".to_string(),
        };
        assert!(transient.is_retryable());
        assert!(!transient.fails_swap());

        let rejected = CoordinatorError::SubmissionRejected("bad hashlock".to_string());
        assert!(!rejected.is_retryable());
        assert!(rejected.fails_swap());

        let ledger = CoordinatorError::LedgerInconsistency {
            swap_id: "s".to_string(),
            message: "hash mismatch".to_string(),
        };
        assert!(ledger.is_fatal());
    }
}
