use lyceum_store::StoreError;
use lyceum_types::{BlockId, ChainTime, TransactionId, TypeError, Version};
use thiserror::Error;

/// Errors surfaced by block and transaction application.
///
/// Validation errors reject a single transaction; consensus errors reject a
/// whole block. Broken internal invariants (conservation, undo-stack misuse)
/// are panics, not errors.
#[derive(Debug, Error)]
pub enum ChainError {
    // ---- transaction validation ----
    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unknown account `{0}`")]
    UnknownAccount(String),

    #[error("account name `{0}` is already taken")]
    AccountExists(String),

    #[error("unknown witness `{0}`")]
    UnknownWitness(String),

    #[error("insufficient balance for `{account}`: have {available}, need {required}")]
    InsufficientBalance {
        account: String,
        available: i64,
        required: i64,
    },

    #[error("{kind} authority of `{account}` is not satisfied")]
    MissingAuthority { account: String, kind: &'static str },

    #[error("an authority explicitly required by the transaction is not satisfied")]
    MissingOtherAuthority,

    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] lyceum_crypto::CryptoError),

    #[error("duplicate transaction {0}")]
    DuplicateTransaction(TransactionId),

    #[error("transaction expired at {expiration}, head time is {now}")]
    TransactionExpired { expiration: ChainTime, now: ChainTime },

    #[error("transaction expiration {expiration} is too far past head time {now}")]
    ExpirationTooFar { expiration: ChainTime, now: ChainTime },

    #[error("transaction reference prefix does not match block summary slot {slot}")]
    TaposMismatch { slot: u16 },

    #[error("transaction size {size} exceeds the limit {limit}")]
    OversizedTransaction { size: usize, limit: usize },

    /// Domain-rule rejection raised by an operation evaluator.
    #[error("{0}")]
    Rejected(String),

    // ---- block consensus ----
    #[error("block previous {previous} does not match head {head}")]
    InvalidPreviousBlock { previous: BlockId, head: BlockId },

    #[error("block {0} does not link to any known block")]
    UnlinkableBlock(BlockId),

    #[error("block timestamp {timestamp} is not after head time {head_time}")]
    InvalidBlockTime {
        timestamp: ChainTime,
        head_time: ChainTime,
    },

    #[error("block timestamp {0} does not land on a production slot")]
    OffSlotBlock(ChainTime),

    #[error("transaction merkle root does not match the block contents")]
    MerkleMismatch,

    #[error("block produced by `{producer}` but the slot belongs to `{scheduled}`")]
    WrongProducer { producer: String, scheduled: String },

    #[error("block not signed with `{witness}`'s signing key")]
    BadProducerKey { witness: String },

    #[error("block size {size} exceeds the limit {limit}")]
    OversizedBlock { size: usize, limit: usize },

    #[error("witness `{witness}` reports version {reported}, behind hardfork {current}")]
    StaleHardforkVersion {
        witness: String,
        reported: Version,
        current: Version,
    },

    #[error("cannot pop block {num}: at or below the last irreversible block {lib}")]
    PopIrreversible { num: u32, lib: u32 },

    #[error("no block to pop")]
    EmptyChain,

    // ---- operational ----
    #[error("block log: {0}")]
    BlockLog(#[from] std::io::Error),

    #[error("block log frame at offset {offset} is corrupt: {reason}")]
    CorruptBlockLog { offset: u64, reason: String },

    #[error("genesis document: {0}")]
    InvalidGenesis(String),

    #[error("chain state lock poisoned by a panicked writer")]
    LockPoisoned,
}

impl ChainError {
    /// Shorthand for evaluator-rule rejections.
    pub fn rejected(msg: impl Into<String>) -> Self {
        ChainError::Rejected(msg.into())
    }
}

/// Guard for evaluator domain rules: rejects the enclosing transaction with
/// a [`ChainError::Rejected`] carrying the formatted message.
macro_rules! ensure {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::ChainError::Rejected(format!($($arg)+)));
        }
    };
}

pub(crate) use ensure;
