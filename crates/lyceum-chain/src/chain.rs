//! Shared handle over the chain database.

use std::path::Path;
use std::sync::RwLock;

use lyceum_crypto::SigningKey;
use lyceum_types::{ChainTime, SignedBlock, SignedTransaction};

use crate::database::Database;
use crate::error::ChainError;
use crate::genesis::GenesisState;

/// Single-writer, multi-reader wrapper around [`Database`].
///
/// Every mutation entry point takes the write lock; readers share the
/// database through [`with_read_lock`](Chain::with_read_lock). Undo
/// sessions below this are a rollback primitive, not an isolation
/// primitive, so the lock is what keeps writers exclusive.
pub struct Chain {
    inner: RwLock<Database>,
}

impl Chain {
    /// Opens a chain persisted in `block_log_path`, replaying any logged
    /// history on top of the genesis state.
    pub fn open(genesis: &GenesisState, block_log_path: &Path) -> Result<Self, ChainError> {
        Ok(Self {
            inner: RwLock::new(Database::open(genesis, block_log_path)?),
        })
    }

    /// Opens a chain whose block log lives in memory.
    pub fn open_in_memory(genesis: &GenesisState) -> Result<Self, ChainError> {
        Ok(Self {
            inner: RwLock::new(Database::open_in_memory(genesis)?),
        })
    }

    /// Runs `f` with shared read access to the database.
    pub fn with_read_lock<T>(&self, f: impl FnOnce(&Database) -> T) -> Result<T, ChainError> {
        let db = self.inner.read().map_err(|_| ChainError::LockPoisoned)?;
        Ok(f(&db))
    }

    /// See [`Database::push_block`].
    pub fn push_block(&self, block: SignedBlock, skip_flags: u32) -> Result<bool, ChainError> {
        self.inner
            .write()
            .map_err(|_| ChainError::LockPoisoned)?
            .push_block(block, skip_flags)
    }

    /// See [`Database::push_transaction`].
    pub fn push_transaction(
        &self,
        tx: SignedTransaction,
        skip_flags: u32,
    ) -> Result<(), ChainError> {
        self.inner
            .write()
            .map_err(|_| ChainError::LockPoisoned)?
            .push_transaction(tx, skip_flags)
    }

    /// See [`Database::generate_block`].
    pub fn generate_block(
        &self,
        when: ChainTime,
        witness_owner: &str,
        signing_key: &SigningKey,
        skip_flags: u32,
    ) -> Result<SignedBlock, ChainError> {
        self.inner
            .write()
            .map_err(|_| ChainError::LockPoisoned)?
            .generate_block(when, witness_owner, signing_key, skip_flags)
    }
}
