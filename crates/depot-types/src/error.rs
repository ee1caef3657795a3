use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid business identifier {value:?}: {reason}")]
    InvalidBusinessId { value: String, reason: String },

    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("invalid deposit identifier: {0}")]
    InvalidDepositId(String),
}
