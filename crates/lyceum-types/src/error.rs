use thiserror::Error;

/// Errors produced while constructing or validating protocol types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex encoding: {0}")]
    InvalidHex(String),

    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid account name '{name}': {reason}")]
    InvalidAccountName { name: String, reason: &'static str },

    #[error("percent {0} exceeds 10000 basis points")]
    PercentOutOfRange(u16),

    #[error("token amount arithmetic overflow")]
    AmountOverflow,

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("authority is malformed: {0}")]
    MalformedAuthority(String),

    #[error("serialization failed: {0}")]
    Serialization(String),
}
