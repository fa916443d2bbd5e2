//! Push, pop, and generation entry points, plus every check a block or
//! transaction must pass on its way into the chain.
//!
//! A pushed block opens one undo session that stays open as the block's
//! undo level; each transaction inside it runs its operations in nested
//! sessions so a rejected operation leaves nothing behind. Fork choice is
//! longest chain: a block extending a side branch is stored but not
//! applied until its branch outgrows the applied one.

use std::collections::BTreeSet;

use tracing::{debug, error, info, warn};

use lyceum_crypto::{merkle_root, verify_signature, SigningKey};
use lyceum_types::{
    BlockHeader, BlockHeaderExtension, BlockId, ChainTime, Operation, PublicKey,
    RequiredAuthorities, SignatureBytes, SignedBlock, SignedTransaction,
};

use crate::constants::BLOCKCHAIN_VERSION;
use crate::error::ChainError;
use crate::skip;
use crate::state::TransactionDedup;

use super::Database;

/// Serialized-size allowance reserved for the header and signature when
/// packing transactions into a produced block.
const BLOCK_HEADER_SIZE_ALLOWANCE: usize = 512;

impl Database {
    // ------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------

    /// Stores a block and applies it if it extends the best chain.
    ///
    /// Returns `true` when the applied head moved (the block extended it
    /// directly or triggered a fork switch) and `false` when the block
    /// landed on a branch that is not yet the longest. Pending
    /// transactions are set aside for the duration and revalidated
    /// against the new head afterwards.
    pub fn push_block(&mut self, block: SignedBlock, skip_flags: u32) -> Result<bool, ChainError> {
        let pending = self.take_pending();
        let result = self.handle_block(block, skip_flags);
        self.restore_pending(pending, skip::NOTHING);
        result
    }

    fn handle_block(&mut self, block: SignedBlock, skip_flags: u32) -> Result<bool, ChainError> {
        let head_id = self.head_block_id();
        let new_head = self.fork_db.push_block(block.clone())?;

        if new_head.previous != head_id {
            // The longest branch does not grow out of the applied head.
            // Either it is still shorter (keep the block for later) or it
            // has overtaken the applied branch and we move onto it.
            if new_head.num <= self.head_block_num() {
                debug!(num = block.block_num(), "block stored on a shorter fork");
                return Ok(false);
            }
            self.switch_forks(new_head.id, skip_flags)?;
            return Ok(true);
        }

        self.state.begin_session();
        match self.apply_block(&block, skip_flags) {
            Ok(()) => Ok(true),
            Err(e) => {
                error!(num = block.block_num(), error = %e, "rejecting pushed block");
                self.state.undo_session();
                self.fork_db.remove_with_descendants(&block.id());
                Err(e)
            }
        }
    }

    /// Validates a transaction against the pending state and queues it
    /// for the next produced block.
    pub fn push_transaction(
        &mut self,
        tx: SignedTransaction,
        skip_flags: u32,
    ) -> Result<(), ChainError> {
        let size = tx.encoded_size();
        let limit = self.get_dynamic_global_properties().maximum_block_size as usize
            - BLOCK_HEADER_SIZE_ALLOWANCE;
        if size > limit {
            return Err(ChainError::OversizedTransaction { size, limit });
        }

        self.ensure_pending_session();
        let id = tx.id();
        self.with_session(|db| db.apply_transaction(&tx, skip_flags))?;
        self.pending_tx.push(tx);
        debug!(tx = %id, "transaction queued");
        Ok(())
    }

    /// Produces, signs, and pushes the block for the slot covering
    /// `when`, packing as many pending transactions as fit.
    ///
    /// Candidates are applied on a scratch session that is discarded
    /// afterwards; the block only becomes state through the regular
    /// [`push_block`](Self::push_block) path, which also revalidates
    /// whatever stayed pending.
    pub fn generate_block(
        &mut self,
        when: ChainTime,
        witness_owner: &str,
        signing_key: &SigningKey,
        skip_flags: u32,
    ) -> Result<SignedBlock, ChainError> {
        let slot = self.get_slot_at_time(when);
        if slot == 0 {
            return Err(ChainError::OffSlotBlock(when));
        }
        let scheduled = self.get_scheduled_witness(slot);
        if scheduled != witness_owner {
            return Err(ChainError::WrongProducer {
                producer: witness_owner.to_string(),
                scheduled,
            });
        }
        let witness_key = self.get_witness(witness_owner)?.signing_key;
        if skip_flags & skip::WITNESS_SIGNATURE == 0 && witness_key != signing_key.public() {
            return Err(ChainError::BadProducerKey {
                witness: witness_owner.to_string(),
            });
        }

        let pending = self.take_pending();
        let size_limit = self.get_dynamic_global_properties().maximum_block_size as usize;
        let mut total_size = BLOCK_HEADER_SIZE_ALLOWANCE;
        let mut included = Vec::new();
        let mut postponed = 0usize;

        self.state.begin_session();
        for tx in &pending {
            if tx.transaction.expiration <= when {
                continue;
            }
            let tx_size = tx.encoded_size();
            if total_size + tx_size > size_limit {
                postponed += 1;
                continue;
            }
            match self.with_session(|db| db.apply_transaction(tx, skip_flags)) {
                Ok(()) => {
                    total_size += tx_size;
                    included.push(tx.clone());
                }
                Err(e) => {
                    debug!(tx = %tx.id(), error = %e, "transaction left out of produced block");
                }
            }
        }
        self.state.undo_session();
        if postponed > 0 {
            warn!(postponed, "transactions postponed past the block size limit");
        }
        // Hand the full list back; push_block below revalidates it and the
        // block's own transactions drop out through the dedup check.
        self.pending_tx = pending;

        let digests: Vec<[u8; 32]> = included
            .iter()
            .map(|tx| tx.transaction.digest())
            .collect();
        let mut header = BlockHeader {
            previous: self.head_block_id(),
            timestamp: when,
            witness: witness_owner.to_string(),
            transaction_merkle_root: merkle_root(&digests),
            extensions: Vec::new(),
        };

        let (running, fork_vote, fork_time) = {
            let witness = self.get_witness(witness_owner)?;
            (
                witness.running_version,
                witness.hardfork_version_vote,
                witness.hardfork_time_vote,
            )
        };
        if running != BLOCKCHAIN_VERSION {
            header
                .extensions
                .push(BlockHeaderExtension::VersionReport(BLOCKCHAIN_VERSION));
        }
        let binary_fork = BLOCKCHAIN_VERSION.hardfork_version();
        if self.hardfork_properties().current_hardfork_version < binary_fork
            && fork_vote != binary_fork
        {
            // Advertise readiness for the fork this binary implements.
            header.extensions.push(BlockHeaderExtension::HardforkVote {
                version: binary_fork,
                time: fork_time,
            });
        }

        let witness_signature = if skip_flags & skip::WITNESS_SIGNATURE == 0 {
            signing_key.sign(&header.sig_digest())
        } else {
            SignatureBytes::default()
        };
        let block = SignedBlock {
            header,
            witness_signature,
            transactions: included,
        };

        if skip_flags & skip::BLOCK_SIZE_CHECK == 0 {
            let size = block.encoded_size();
            if size > size_limit {
                return Err(ChainError::OversizedBlock {
                    size,
                    limit: size_limit,
                });
            }
        }

        self.push_block(block.clone(), skip_flags)?;
        Ok(block)
    }

    /// Unapplies the head block and queues its transactions for
    /// reapplication on whatever branch is built next.
    pub fn pop_block(&mut self) -> Result<(), ChainError> {
        if self.pending_session_open {
            self.state.undo_session();
            self.pending_session_open = false;
        }

        let head_num = self.head_block_num();
        if head_num == 0 {
            return Err(ChainError::EmptyChain);
        }
        // The undo floor counts blocks whose sessions have been committed;
        // it can run ahead of the stored irreversible number after a pop
        // rewinds the global properties, so honor whichever is higher.
        let floor = self
            .undo_floor
            .max(self.get_dynamic_global_properties().last_irreversible_block_num);
        if head_num <= floor {
            return Err(ChainError::PopIrreversible {
                num: head_num,
                lib: floor,
            });
        }

        let head_id = self.head_block_id();
        let block = self
            .fetch_block_by_id(&head_id)?
            .ok_or(ChainError::UnlinkableBlock(head_id))?;
        self.fork_db.pop_head()?;
        self.state.undo_session();
        self.record_popped_transactions(&block);
        debug!(num = head_num, "block popped");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Fork switching
    // ------------------------------------------------------------------

    /// Moves the applied state onto the branch ending at `new_head_id`.
    ///
    /// On failure the offending block and its descendants are discarded,
    /// the original branch is reapplied, and the original error surfaces
    /// to the caller.
    fn switch_forks(&mut self, new_head_id: BlockId, skip_flags: u32) -> Result<(), ChainError> {
        let old_head_id = self.head_block_id();
        info!(from = %old_head_id, to = %new_head_id, "switching forks");
        let (new_branch, old_branch) = self
            .fork_db
            .fetch_branch_from(&new_head_id, &old_head_id)?;
        let ancestor = new_branch
            .last()
            .map(|item| item.previous)
            .unwrap_or(old_head_id);

        while self.head_block_id() != ancestor {
            self.pop_block()?;
        }

        for item in new_branch.iter().rev() {
            self.state.begin_session();
            if let Err(e) = self.apply_block(&item.block, skip_flags) {
                warn!(num = item.num, error = %e, "fork block failed; restoring original branch");
                self.state.undo_session();
                self.fork_db.remove_with_descendants(&item.id);
                self.fork_db.set_head(&old_head_id);

                while self.head_block_id() != ancestor {
                    self.pop_block()?;
                }
                for original in old_branch.iter().rev() {
                    self.state.begin_session();
                    self.apply_block(&original.block, skip_flags)?;
                }
                return Err(e);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Block application
    // ------------------------------------------------------------------

    /// Applies one block to the open session. The caller owns the session
    /// and decides whether it becomes the block's undo level (push), is
    /// committed outright (replay), or is discarded (scratch work).
    pub(crate) fn apply_block(
        &mut self,
        block: &SignedBlock,
        skip_flags: u32,
    ) -> Result<(), ChainError> {
        if skip_flags & skip::MERKLE_CHECK == 0 {
            let digests: Vec<[u8; 32]> = block
                .transactions
                .iter()
                .map(|tx| tx.transaction.digest())
                .collect();
            if merkle_root(&digests) != block.header.transaction_merkle_root {
                return Err(ChainError::MerkleMismatch);
            }
        }

        self.validate_block_header(block, skip_flags)?;

        if skip_flags & skip::BLOCK_SIZE_CHECK == 0 {
            let size = block.encoded_size();
            let limit = self.get_dynamic_global_properties().maximum_block_size as usize;
            if size > limit {
                return Err(ChainError::OversizedBlock { size, limit });
            }
        }

        self.process_header_extensions(block)?;

        for tx in &block.transactions {
            self.apply_transaction(tx, skip_flags)?;
        }

        self.update_global_dynamic_data(block)?;
        self.update_signing_witness(block)?;
        self.advance_irreversibility()?;
        self.record_block_summary(block)?;
        self.prune_expired_state()?;
        self.update_witness_schedule();
        self.process_research_token_sales()?;
        self.process_funds()?;
        self.process_common_token_withdrawals()?;
        self.process_content_activity_windows()?;
        self.process_hardforks()?;
        self.distribute_grants()?;
        self.reset_per_block_counters();

        if skip_flags & skip::VALIDATE_INVARIANTS == 0 {
            self.validate_invariants();
        }

        debug!(
            num = block.block_num(),
            witness = %block.header.witness,
            transactions = block.transactions.len(),
            "block applied"
        );
        Ok(())
    }

    fn validate_block_header(
        &self,
        block: &SignedBlock,
        skip_flags: u32,
    ) -> Result<(), ChainError> {
        let head_id = self.head_block_id();
        if block.header.previous != head_id {
            return Err(ChainError::InvalidPreviousBlock {
                previous: block.header.previous,
                head: head_id,
            });
        }
        let head_time = self.head_block_time();
        if block.header.timestamp <= head_time {
            return Err(ChainError::InvalidBlockTime {
                timestamp: block.header.timestamp,
                head_time,
            });
        }

        let witness = self.get_witness(&block.header.witness)?;

        if skip_flags & skip::WITNESS_SIGNATURE == 0
            && verify_signature(
                &witness.signing_key,
                &block.header.sig_digest(),
                &block.witness_signature,
            )
            .is_err()
        {
            return Err(ChainError::BadProducerKey {
                witness: block.header.witness.clone(),
            });
        }

        if skip_flags & skip::WITNESS_SCHEDULE_CHECK == 0 {
            let slot = self.get_slot_at_time(block.header.timestamp);
            if slot == 0 {
                return Err(ChainError::OffSlotBlock(block.header.timestamp));
            }
            let scheduled = self.get_scheduled_witness(slot);
            if scheduled != block.header.witness {
                return Err(ChainError::WrongProducer {
                    producer: block.header.witness.clone(),
                    scheduled,
                });
            }
        }

        // A witness that has not caught up with the current hardfork would
        // diverge on the first changed rule; refuse its blocks outright.
        let current = self.hardfork_properties().current_hardfork_version;
        if witness.running_version < current {
            return Err(ChainError::StaleHardforkVersion {
                witness: block.header.witness.clone(),
                reported: witness.running_version,
                current,
            });
        }
        Ok(())
    }

    /// Records what the producing witness reports about itself: the
    /// version it runs and the hardfork it is prepared to apply.
    fn process_header_extensions(&mut self, block: &SignedBlock) -> Result<(), ChainError> {
        for extension in &block.header.extensions {
            match extension {
                BlockHeaderExtension::VersionReport(version) => {
                    let version = *version;
                    self.modify_witness(&block.header.witness, |w| {
                        w.running_version = version;
                    })?;
                }
                BlockHeaderExtension::HardforkVote { version, time } => {
                    let (version, time) = (*version, *time);
                    self.modify_witness(&block.header.witness, |w| {
                        w.hardfork_version_vote = version;
                        w.hardfork_time_vote = time;
                    })?;
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transaction application
    // ------------------------------------------------------------------

    /// Applies one transaction to the open session: stateless validation,
    /// dedup, signatures and authorities, reference-block and expiration
    /// checks, then every operation in order.
    pub(crate) fn apply_transaction(
        &mut self,
        tx: &SignedTransaction,
        skip_flags: u32,
    ) -> Result<(), ChainError> {
        if skip_flags & skip::TRANSACTION_VALIDATION == 0 {
            tx.validate()?;
        }

        let tx_id = tx.id();
        if skip_flags & skip::TRANSACTION_DUPE_CHECK == 0
            && self.state.tx_dedup.iter().any(|d| d.trx_id == tx_id)
        {
            return Err(ChainError::DuplicateTransaction(tx_id));
        }

        if skip_flags & skip::TRANSACTION_SIGNATURES == 0 {
            let digest = tx.transaction.sig_digest(&self.chain_id());
            let mut signers = BTreeSet::new();
            for sig in &tx.signatures {
                verify_signature(&sig.signer, &digest, &sig.signature)?;
                signers.insert(sig.signer);
            }
            if skip_flags & skip::AUTHORITY_CHECK == 0 {
                let mut required = RequiredAuthorities::default();
                for op in &tx.transaction.operations {
                    op.required_authorities(&mut required);
                }
                self.check_authorities(&required, &signers)?;
            }
        }

        // Reference-block and expiration rules need an applied block to
        // measure against; transactions in the first block get a pass.
        if self.head_block_num() > 0 {
            if skip_flags & skip::TAPOS_CHECK == 0 {
                let slot = tx.transaction.ref_block_num;
                let summary = self
                    .state
                    .block_summaries
                    .get(u64::from(slot))
                    .expect("the summary ring covers every slot");
                if summary.block_id.tapos_prefix() != tx.transaction.ref_block_prefix {
                    return Err(ChainError::TaposMismatch { slot });
                }
            }

            let now = self.head_block_time();
            let expiration = tx.transaction.expiration;
            if expiration <= now {
                return Err(ChainError::TransactionExpired { expiration, now });
            }
            let horizon = now.saturating_add(self.constants().max_time_until_expiration_secs);
            if expiration > horizon {
                return Err(ChainError::ExpirationTooFar { expiration, now });
            }
        }

        if skip_flags & skip::TRANSACTION_DUPE_CHECK == 0 {
            let expiration = tx.transaction.expiration;
            self.state.tx_dedup.create(|id| TransactionDedup {
                id,
                trx_id: tx_id,
                expiration,
            });
        }

        for op in &tx.transaction.operations {
            self.apply_operation(op)?;
        }
        Ok(())
    }

    /// Runs one operation in its own nested session so a rejected
    /// operation leaves no partial writes behind.
    fn apply_operation(&mut self, op: &Operation) -> Result<(), ChainError> {
        let evaluate = self.registry().get_evaluator(op.kind());
        self.with_session(|db| evaluate(db, op))
    }

    /// Checks the accumulated authority requirements against the set of
    /// keys that actually signed.
    ///
    /// Higher tiers satisfy lower ones: an owner signature covers active
    /// and posting requirements, an active signature covers posting.
    /// Delegated accounts inside an authority are resolved through their
    /// active tier (posting for posting-tier requirements).
    fn check_authorities(
        &self,
        required: &RequiredAuthorities,
        signers: &BTreeSet<PublicKey>,
    ) -> Result<(), ChainError> {
        let mut by_active = |name: &str| self.find_account(name).map(|a| a.active.clone());
        let mut by_posting = |name: &str| self.find_account(name).map(|a| a.posting.clone());

        for name in &required.owner {
            let account = self.get_account(name)?;
            if !account.owner.is_satisfied_by(signers, &mut by_active) {
                return Err(ChainError::MissingAuthority {
                    account: name.clone(),
                    kind: "owner",
                });
            }
        }
        for name in &required.active {
            let account = self.get_account(name)?;
            if !account.active.is_satisfied_by(signers, &mut by_active)
                && !account.owner.is_satisfied_by(signers, &mut by_active)
            {
                return Err(ChainError::MissingAuthority {
                    account: name.clone(),
                    kind: "active",
                });
            }
        }
        for name in &required.posting {
            let account = self.get_account(name)?;
            if !account.posting.is_satisfied_by(signers, &mut by_posting)
                && !account.active.is_satisfied_by(signers, &mut by_active)
                && !account.owner.is_satisfied_by(signers, &mut by_active)
            {
                return Err(ChainError::MissingAuthority {
                    account: name.clone(),
                    kind: "posting",
                });
            }
        }
        for authority in &required.other {
            if !authority.is_satisfied_by(signers, &mut by_active) {
                return Err(ChainError::MissingOtherAuthority);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use lyceum_types::operations::Transfer;
    use lyceum_types::{Authority, Tokens, Transaction, TransactionSignature, Version};

    use super::*;
    use crate::testing::{dev_db, dev_genesis, dev_key};

    fn transfer(from: &str, to: &str, amount: i64) -> Operation {
        Operation::Transfer(Transfer {
            from: from.to_string(),
            to: to.to_string(),
            amount: Tokens::new(amount),
            memo: String::new(),
        })
    }

    fn signed_tx(db: &Database, key: &SigningKey, ops: Vec<Operation>) -> SignedTransaction {
        let mut tx = Transaction {
            ref_block_num: 0,
            ref_block_prefix: 0,
            expiration: db.head_block_time().saturating_add(600),
            operations: ops,
        };
        tx.set_reference_block(&db.head_block_id());
        let digest = tx.sig_digest(&db.chain_id());
        SignedTransaction {
            transaction: tx,
            signatures: vec![TransactionSignature {
                signer: key.public(),
                signature: key.sign(&digest),
            }],
        }
    }

    fn produce(db: &mut Database, signer: &SigningKey) -> SignedBlock {
        let when = db.get_slot_time(1);
        let witness = db.get_scheduled_witness(1);
        db.generate_block(when, &witness, signer, skip::NOTHING)
            .unwrap()
    }

    fn balance(db: &Database, name: &str) -> i64 {
        db.get_account(name).unwrap().balance.amount()
    }

    #[test]
    fn generated_block_carries_pending_transfers() {
        let (_, signer) = dev_genesis();
        let mut db = dev_db();
        let alice_before = balance(&db, "alice");
        let bobby_before = balance(&db, "bobby");

        let tx = signed_tx(&db, &dev_key(1), vec![transfer("alice", "bobby", 50)]);
        db.push_transaction(tx, skip::NOTHING).unwrap();

        let block = produce(&mut db, &signer);
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(db.head_block_num(), 1);
        assert_eq!(db.head_block_id(), block.id());
        assert_eq!(balance(&db, "alice"), alice_before - 50);
        assert_eq!(balance(&db, "bobby"), bobby_before + 50);
    }

    #[test]
    fn push_block_accepts_a_block_produced_elsewhere() {
        let (_, signer) = dev_genesis();
        let mut producer = dev_db();
        let mut observer = dev_db();

        let tx = signed_tx(&producer, &dev_key(2), vec![transfer("bobby", "alice", 10)]);
        producer.push_transaction(tx, skip::NOTHING).unwrap();
        let block = produce(&mut producer, &signer);

        assert!(observer.push_block(block.clone(), skip::NOTHING).unwrap());
        assert_eq!(observer.head_block_id(), block.id());
        assert_eq!(balance(&observer, "alice"), balance(&producer, "alice"));
    }

    #[test]
    fn transactions_need_the_right_signature() {
        let mut db = dev_db();

        // Signed with a key that answers to nobody.
        let tx = signed_tx(&db, &dev_key(9), vec![transfer("alice", "bobby", 5)]);
        let err = db.push_transaction(tx, skip::NOTHING).unwrap_err();
        assert!(matches!(
            err,
            ChainError::MissingAuthority { kind: "active", .. }
        ));

        // No signatures at all.
        let mut tx = signed_tx(&db, &dev_key(1), vec![transfer("alice", "bobby", 5)]);
        tx.signatures.clear();
        let err = db.push_transaction(tx, skip::NOTHING).unwrap_err();
        assert!(matches!(err, ChainError::MissingAuthority { .. }));

        // A corrupted signature fails verification before authority lookup.
        let mut tx = signed_tx(&db, &dev_key(1), vec![transfer("alice", "bobby", 5)]);
        tx.signatures[0].signature.0[0] ^= 0x01;
        let err = db.push_transaction(tx, skip::NOTHING).unwrap_err();
        assert!(matches!(err, ChainError::InvalidSignature(_)));
    }

    #[test]
    fn owner_key_satisfies_lower_tiers() {
        let mut db = dev_db();
        // Split bobby's tiers so active no longer equals owner.
        let active_key = dev_key(7);
        db.modify_account("bobby", |a| {
            a.active = Authority::single_key(active_key.public());
        })
        .unwrap();

        let tx = signed_tx(&db, &active_key, vec![transfer("bobby", "alice", 5)]);
        db.push_transaction(tx, skip::NOTHING).unwrap();

        // The owner key still covers the active requirement.
        let tx = signed_tx(&db, &dev_key(2), vec![transfer("bobby", "alice", 6)]);
        db.push_transaction(tx, skip::NOTHING).unwrap();
    }

    #[test]
    fn explicitly_required_authorities_are_checked_against_raw_keys() {
        let db = dev_db();
        let key = dev_key(5);
        let mut required = RequiredAuthorities::default();
        required.other.push(Authority::single_key(key.public()));

        let mut signers = BTreeSet::new();
        signers.insert(dev_key(6).public());
        assert!(matches!(
            db.check_authorities(&required, &signers).unwrap_err(),
            ChainError::MissingOtherAuthority
        ));

        signers.insert(key.public());
        db.check_authorities(&required, &signers).unwrap();
    }

    #[test]
    fn duplicate_transactions_bounce() {
        let mut db = dev_db();
        let tx = signed_tx(&db, &dev_key(1), vec![transfer("alice", "bobby", 5)]);
        db.push_transaction(tx.clone(), skip::NOTHING).unwrap();
        assert!(matches!(
            db.push_transaction(tx, skip::NOTHING).unwrap_err(),
            ChainError::DuplicateTransaction(_)
        ));
    }

    #[test]
    fn expiration_and_reference_checks_need_an_applied_block() {
        let (_, signer) = dev_genesis();
        let mut db = dev_db();
        produce(&mut db, &signer);
        let now = db.head_block_time();

        let mut expired = signed_tx(&db, &dev_key(1), vec![transfer("alice", "bobby", 5)]);
        expired.transaction.expiration = now;
        let digest = expired.transaction.sig_digest(&db.chain_id());
        expired.signatures[0].signature = dev_key(1).sign(&digest);
        assert!(matches!(
            db.push_transaction(expired, skip::NOTHING).unwrap_err(),
            ChainError::TransactionExpired { .. }
        ));

        let mut distant = signed_tx(&db, &dev_key(1), vec![transfer("alice", "bobby", 5)]);
        distant.transaction.expiration = now.saturating_add(86_400);
        let digest = distant.transaction.sig_digest(&db.chain_id());
        distant.signatures[0].signature = dev_key(1).sign(&digest);
        assert!(matches!(
            db.push_transaction(distant, skip::NOTHING).unwrap_err(),
            ChainError::ExpirationTooFar { .. }
        ));

        let mut untethered = signed_tx(&db, &dev_key(1), vec![transfer("alice", "bobby", 5)]);
        untethered.transaction.ref_block_prefix ^= 0xdead_beef;
        let digest = untethered.transaction.sig_digest(&db.chain_id());
        untethered.signatures[0].signature = dev_key(1).sign(&digest);
        assert!(matches!(
            db.push_transaction(untethered, skip::NOTHING).unwrap_err(),
            ChainError::TaposMismatch { .. }
        ));
    }

    #[test]
    fn oversized_transactions_bounce_before_evaluation() {
        let mut db = dev_db();
        let limit = db.get_dynamic_global_properties().maximum_block_size as usize;
        let memo = "x".repeat(limit);
        let op = Operation::Transfer(Transfer {
            from: "alice".to_string(),
            to: "bobby".to_string(),
            amount: Tokens::new(1),
            memo,
        });
        let tx = signed_tx(&db, &dev_key(1), vec![op]);
        assert!(matches!(
            db.push_transaction(tx, skip::NOTHING).unwrap_err(),
            ChainError::OversizedTransaction { .. }
        ));
    }

    #[test]
    fn a_failed_operation_rolls_the_whole_transaction_back() {
        let mut db = dev_db();
        let alice_before = balance(&db, "alice");
        let tx = signed_tx(
            &db,
            &dev_key(1),
            vec![
                transfer("alice", "bobby", 10),
                transfer("alice", "bobby", i64::MAX / 2),
            ],
        );
        assert!(db.push_transaction(tx, skip::NOTHING).is_err());
        assert_eq!(balance(&db, "alice"), alice_before);
    }

    #[test]
    fn expired_pending_transactions_are_left_out_of_the_block() {
        let (_, signer) = dev_genesis();
        let mut db = dev_db();
        let alice_before = balance(&db, "alice");

        // Valid while the chain is empty, expired by the first slot.
        let mut tx = signed_tx(&db, &dev_key(1), vec![transfer("alice", "bobby", 5)]);
        tx.transaction.expiration = db.genesis_time().saturating_add(1);
        let digest = tx.transaction.sig_digest(&db.chain_id());
        tx.signatures[0].signature = dev_key(1).sign(&digest);
        db.push_transaction(tx, skip::NOTHING).unwrap();

        let block = produce(&mut db, &signer);
        assert!(block.transactions.is_empty());
        assert_eq!(balance(&db, "alice"), alice_before);
    }

    #[test]
    fn slot_and_producer_rules_gate_generation() {
        let (_, signer) = dev_genesis();
        let mut db = dev_db();

        let before_first_slot = db.genesis_time().saturating_add(1);
        assert!(matches!(
            db.generate_block(before_first_slot, "alice", &signer, skip::NOTHING)
                .unwrap_err(),
            ChainError::OffSlotBlock(_)
        ));

        let when = db.get_slot_time(1);
        assert!(matches!(
            db.generate_block(when, "bobby", &signer, skip::NOTHING)
                .unwrap_err(),
            ChainError::WrongProducer { .. }
        ));

        assert!(matches!(
            db.generate_block(when, "alice", &dev_key(9), skip::NOTHING)
                .unwrap_err(),
            ChainError::BadProducerKey { .. }
        ));
    }

    #[test]
    fn tampered_blocks_are_rejected_and_leave_no_trace() {
        let (_, signer) = dev_genesis();
        let mut producer = dev_db();
        let tx = signed_tx(&producer, &dev_key(1), vec![transfer("alice", "bobby", 5)]);
        producer.push_transaction(tx, skip::NOTHING).unwrap();
        let block = produce(&mut producer, &signer);

        let mut observer = dev_db();

        let mut forged = block.clone();
        forged.witness_signature.0[0] ^= 0x01;
        assert!(matches!(
            observer.push_block(forged, skip::NOTHING).unwrap_err(),
            ChainError::BadProducerKey { .. }
        ));

        let mut wrong_root = block.clone();
        wrong_root.header.transaction_merkle_root[0] ^= 0x01;
        wrong_root.witness_signature = signer.sign(&wrong_root.header.sig_digest());
        assert!(matches!(
            observer.push_block(wrong_root, skip::NOTHING).unwrap_err(),
            ChainError::MerkleMismatch
        ));

        // Rejections leave the chain pristine; the honest block still fits.
        assert_eq!(observer.head_block_num(), 0);
        assert!(observer.push_block(block, skip::NOTHING).unwrap());
        assert_eq!(observer.head_block_num(), 1);
    }

    #[test]
    fn popped_transactions_wait_for_the_next_block() {
        let (_, signer) = dev_genesis();
        let mut db = dev_db();
        // The fork window needs a parent to pop back onto.
        produce(&mut db, &signer);
        let alice_before = balance(&db, "alice");

        let tx = signed_tx(&db, &dev_key(1), vec![transfer("alice", "bobby", 25)]);
        db.push_transaction(tx, skip::NOTHING).unwrap();
        produce(&mut db, &signer);
        assert_eq!(balance(&db, "alice"), alice_before - 25);

        db.pop_block().unwrap();
        assert_eq!(db.head_block_num(), 1);
        assert_eq!(balance(&db, "alice"), alice_before);
        assert_eq!(db.popped_tx.len(), 1);

        // The next produced block restores the transaction to pending,
        // and the one after that carries it.
        let empty = produce(&mut db, &signer);
        assert!(empty.transactions.is_empty());
        let carried = produce(&mut db, &signer);
        assert_eq!(carried.transactions.len(), 1);
        assert_eq!(balance(&db, "alice"), alice_before - 25);
    }

    #[test]
    fn confirmed_blocks_reach_the_log_and_refuse_to_pop() {
        let (_, signer) = dev_genesis();
        let mut db = dev_db();
        for _ in 0..3 {
            produce(&mut db, &signer);
        }
        // A single witness confirms each block one slot later.
        assert_eq!(
            db.get_dynamic_global_properties().last_irreversible_block_num,
            2
        );
        assert_eq!(db.block_log().last_block_num(), 2);

        db.pop_block().unwrap();
        assert_eq!(db.head_block_num(), 2);
        assert!(matches!(
            db.pop_block().unwrap_err(),
            ChainError::PopIrreversible { num: 2, .. }
        ));
    }

    #[test]
    fn longer_branches_win() {
        let (_, signer) = dev_genesis();
        let mut ours = dev_db();
        let mut theirs = dev_db();

        let shared = produce(&mut ours, &signer);
        theirs.push_block(shared, skip::NOTHING).unwrap();

        // Both sides extend block 1 on different slots.
        let ours_2 = produce(&mut ours, &signer);
        let their_when = theirs.get_slot_time(2);
        let theirs_2 = theirs
            .generate_block(their_when, "alice", &signer, skip::NOTHING)
            .unwrap();
        assert_ne!(ours_2.id(), theirs_2.id());

        // Same height: first seen stays applied.
        assert!(!ours.push_block(theirs_2, skip::NOTHING).unwrap());
        assert_eq!(ours.head_block_id(), ours_2.id());

        // Their branch outgrows ours and takes over.
        let theirs_3 = produce(&mut theirs, &signer);
        assert!(ours.push_block(theirs_3.clone(), skip::NOTHING).unwrap());
        assert_eq!(ours.head_block_num(), 3);
        assert_eq!(ours.head_block_id(), theirs_3.id());
    }

    #[test]
    fn a_fork_switch_replays_transactions_from_the_losing_branch() {
        let (_, signer) = dev_genesis();
        let mut ours = dev_db();
        let mut theirs = dev_db();
        let bobby_before = balance(&ours, "bobby");

        let shared = produce(&mut ours, &signer);
        theirs.push_block(shared, skip::NOTHING).unwrap();

        // Our branch carries a transfer the other branch never saw.
        let tx = signed_tx(&ours, &dev_key(1), vec![transfer("alice", "bobby", 40)]);
        ours.push_transaction(tx, skip::NOTHING).unwrap();
        produce(&mut ours, &signer);
        assert_eq!(balance(&ours, "bobby"), bobby_before + 40);

        let their_when = theirs.get_slot_time(2);
        let theirs_2 = theirs
            .generate_block(their_when, "alice", &signer, skip::NOTHING)
            .unwrap();
        let theirs_3 = produce(&mut theirs, &signer);

        ours.push_block(theirs_2, skip::NOTHING).unwrap();
        assert!(ours.push_block(theirs_3.clone(), skip::NOTHING).unwrap());
        assert_eq!(ours.head_block_id(), theirs_3.id());

        // The transfer fell back to pending and still shows through it.
        assert_eq!(balance(&ours, "bobby"), bobby_before + 40);
        assert_eq!(ours.pending_tx.len(), 1);
    }

    #[test]
    fn a_fresh_chain_votes_for_its_own_hardfork() {
        let (_, signer) = dev_genesis();
        let mut db = dev_db();
        let first = produce(&mut db, &signer);
        assert!(first.header.extensions.iter().any(|e| matches!(
            e,
            BlockHeaderExtension::HardforkVote { version, .. }
                if *version == BLOCKCHAIN_VERSION.hardfork_version()
        )));
        assert_eq!(
            db.get_witness("alice").unwrap().hardfork_version_vote,
            BLOCKCHAIN_VERSION.hardfork_version()
        );

        // The recorded vote keeps later blocks quiet.
        let second = produce(&mut db, &signer);
        assert!(second.header.extensions.is_empty());
    }

    #[test]
    fn version_reports_refresh_the_witness_record() {
        let (_, signer) = dev_genesis();
        let mut db = dev_db();
        let stale = Version::new(0, 0, 9);
        db.modify_witness("alice", |w| w.running_version = stale)
            .unwrap();

        let block = produce(&mut db, &signer);
        assert!(block
            .header
            .extensions
            .iter()
            .any(|e| matches!(e, BlockHeaderExtension::VersionReport(v) if *v == BLOCKCHAIN_VERSION)));
        assert_eq!(
            db.get_witness("alice").unwrap().running_version,
            BLOCKCHAIN_VERSION
        );
    }

    #[test]
    fn blocks_on_stale_timestamps_are_rejected() {
        let (_, signer) = dev_genesis();
        let mut db = dev_db();
        let block = produce(&mut db, &signer);

        let mut replayed = block.clone();
        replayed.header.previous = db.head_block_id();
        replayed.witness_signature = signer.sign(&replayed.header.sig_digest());
        assert!(matches!(
            db.push_block(replayed, skip::NOTHING).unwrap_err(),
            ChainError::InvalidBlockTime { .. }
        ));
    }
}
