//! Foundation protocol types for the Lyceum research chain.
//!
//! This crate defines everything two nodes must agree on byte-for-byte:
//! chain time, token amounts and percent arithmetic, account names,
//! weighted-threshold authorities, the closed [`Operation`] set, transaction
//! and block structures, and the domain-separated digests that identify them.
//! Every other Lyceum crate depends on `lyceum-types`.
//!
//! # Key Types
//!
//! - [`ChainTime`] -- consensus clock, whole seconds
//! - [`Tokens`] -- signed token amount shared by all conservation pools
//! - [`Authority`] -- weighted-threshold signing requirement
//! - [`Operation`] / [`OperationKind`] -- the tagged operation union
//! - [`Transaction`] / [`SignedBlock`] -- wire structures with TaPoS fields
//! - [`BlockId`] / [`TransactionId`] / [`ChainId`] -- BLAKE3 identifiers

pub mod account;
pub mod asset;
pub mod authority;
pub mod block;
pub mod error;
pub mod ids;
pub mod operations;
pub mod proposal;
pub mod time;
pub mod transaction;

pub use account::{validate_account_name, AccountName};
pub use asset::{multiply_ratio, percent_of, validate_percent, Tokens, FULL_PERCENT, ONE_PERCENT};
pub use authority::{Authority, AuthorityKind, PublicKey, MAX_AUTHORITY_DEPTH};
pub use block::{
    BlockHeader, BlockHeaderExtension, SignedBlock, Version, MIN_BLOCK_SIZE_LIMIT,
};
pub use error::TypeError;
pub use ids::{
    domain_digest, BlockId, ChainId, DisciplineId, InviteId, ProposalId, ResearchContentId,
    ResearchGroupId, ResearchId, ReviewId, TokenSaleId, TransactionId,
};
pub use operations::{ChainProperties, Operation, OperationKind, RequiredAuthorities};
pub use proposal::{ProposalAction, ResearchContentKind};
pub use time::ChainTime;
pub use transaction::{
    SignatureBytes, SignedTransaction, Transaction, TransactionSignature, MAX_TRANSACTION_SIZE,
};
