//! Error types for the anchor relayer

use thiserror::Error;

/// Error message returned by a node when a transaction with the same nonce is
/// already pending at an equal or higher gas price.
pub const TRANSACTION_UNDERPRICED: &str = "replacement transaction underpriced";

/// Error message returned by a node when the nonce was already consumed.
pub const NONCE_TOO_LOW: &str = "nonce too low";

/// Main error type for the relayer
#[derive(Error, Debug)]
pub enum AnchorError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Submission error: {0}")]
    Submission(String),

    #[error("Confirmation cancelled while waiting for {event}")]
    ConfirmationCancelled { event: String },

    #[error("Timeout waiting for {operation}")]
    ConfirmationTimeout { operation: String },

    #[error("Failed to filter {event} logs: {message}")]
    ConfirmationSubscription { event: String, message: String },

    #[error("Malformed task parameter [{key}]: {reason}")]
    Parameter { key: String, reason: String },

    #[error("Task {name} is not registered")]
    UnknownTask { name: String },

    #[error("No identity registered for {cent_id}")]
    IdentityNotFound { cent_id: String },

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnchorError {
    /// Check if the ledger rejected a transaction because another one raced it
    /// for the same nonce.
    pub fn is_nonce_race(&self) -> bool {
        match self {
            AnchorError::Ledger(message) | AnchorError::Submission(message) => {
                message.contains(TRANSACTION_UNDERPRICED) || message.contains(NONCE_TOO_LOW)
            }
            _ => false,
        }
    }

    /// Check if the error was produced while waiting for a ledger event
    pub fn is_confirmation_failure(&self) -> bool {
        matches!(
            self,
            AnchorError::ConfirmationCancelled { .. }
                | AnchorError::ConfirmationTimeout { .. }
                | AnchorError::ConfirmationSubscription { .. }
        )
    }

    pub(crate) fn parameter(key: &str, reason: impl Into<String>) -> Self {
        AnchorError::Parameter {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for relayer operations
pub type AnchorResult<T> = Result<T, AnchorError>;
