//! Error types for encrypted-value operations.

use thiserror::Error;

/// Errors that can occur while operating on encrypted values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("Unknown ciphertext handle {0}")]
    UnknownHandle(u64),

    #[error("Budget exhausted: need {needed}, remaining {remaining}")]
    BudgetExhausted { needed: u64, remaining: u64 },

    #[error("Invalid random bound: {0}")]
    InvalidBound(u64),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}
