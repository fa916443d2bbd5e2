//! Chain state machine for the Lyceum research chain.
//!
//! This crate is the heart of Lyceum. It provides:
//! - The [`Database`]: canonical state behind typed tables, undo sessions,
//!   and the block/transaction application pipeline
//! - Longest-chain fork choice over an in-memory block tree, backed by an
//!   append-only block log for irreversible history
//! - An evaluator per [`Operation`](lyceum_types::Operation) kind
//! - Witness election and shuffling, emission and reward settlement, and
//!   the rest of the end-of-block maintenance sequence
//! - The [`Chain`] handle: single-writer, multi-reader access
//! - Genesis documents and validation skip flags for replay and tests

pub mod block_log;
pub mod chain;
pub mod constants;
pub mod database;
pub mod error;
pub mod evaluators;
pub mod fork;
pub mod genesis;
pub mod skip;
pub mod state;

pub use block_log::BlockLog;
pub use chain::Chain;
pub use constants::{ChainConstants, BLOCKCHAIN_VERSION};
pub use database::Database;
pub use error::ChainError;
pub use fork::{ForkDatabase, ForkItem};
pub use genesis::{
    GenesisAccount, GenesisDiscipline, GenesisExpertToken, GenesisState, GenesisWitness,
};
