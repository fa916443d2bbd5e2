//! The chain database: canonical state plus the machinery that mutates it.
//!
//! Submodules split the mutation pipeline along its natural seams:
//!
//! - [`apply`] -- push/pop/generate entry points and per-block application
//! - [`maintenance`] -- the end-of-block processing sequence
//! - [`schedule`] -- witness election, the timeshare race, and shuffling
//! - [`rewards`] -- emission, reward pools, and review-window settlement
//! - [`sales`] -- token-sale activation and settlement

mod apply;
mod maintenance;
mod rewards;
mod sales;
mod schedule;

use std::collections::VecDeque;
use std::path::Path;

use tracing::{debug, info};

use lyceum_types::{
    AccountName, Authority, BlockId, ChainId, ChainTime, DisciplineId, ResearchContentId,
    ResearchGroupId, ResearchId, ReviewId, SignedBlock, SignedTransaction, TokenSaleId, Tokens,
    FULL_PERCENT,
};

use crate::block_log::BlockLog;
use crate::constants::{ChainConstants, BLOCKCHAIN_VERSION};
use crate::error::ChainError;
use crate::evaluators::EvaluatorRegistry;
use crate::fork::ForkDatabase;
use crate::genesis::GenesisState;
use crate::skip;
use crate::state::{
    Account, BlockSummary, Discipline, DynamicGlobalProperties, ExpertToken, HardforkProperties,
    Research, ResearchContent, ResearchGroup, ResearchGroupToken, ResearchToken, Review,
    ScheduleKind, State, TokenSale, Witness, WitnessSchedule,
};

/// Group tokens are shares out of this many units.
pub const GROUP_SHARE_UNITS: i64 = FULL_PERCENT as i64;

/// The deterministic state machine of one chain.
///
/// All mutation funnels through [`push_block`](Database::push_block),
/// [`push_transaction`](Database::push_transaction), and
/// [`generate_block`](Database::generate_block); everything else is read
/// access. The undo-session stack carries one level per reversible block
/// plus, between blocks, one level of pending transactions on top.
pub struct Database {
    pub(crate) state: State,
    constants: ChainConstants,
    chain_id: ChainId,
    genesis_time: ChainTime,
    registry: EvaluatorRegistry,
    pub(crate) fork_db: ForkDatabase,
    block_log: BlockLog,

    pending_tx: Vec<SignedTransaction>,
    popped_tx: VecDeque<SignedTransaction>,
    pending_session_open: bool,
    /// Number of the newest block whose undo level has been committed.
    undo_floor: u32,
}

impl Database {
    /// Opens a database persisted in `block_log_path`, seeding state from
    /// `genesis` and replaying any logged history.
    pub fn open(genesis: &GenesisState, block_log_path: &Path) -> Result<Self, ChainError> {
        let block_log = BlockLog::open(block_log_path)?;
        Self::boot(genesis, block_log)
    }

    /// An ephemeral database; history lives only in memory.
    pub fn open_in_memory(genesis: &GenesisState) -> Result<Self, ChainError> {
        Self::boot(genesis, BlockLog::in_memory())
    }

    fn boot(genesis: &GenesisState, block_log: BlockLog) -> Result<Self, ChainError> {
        genesis.validate()?;
        let mut db = Database {
            state: State::new(),
            constants: genesis.constants.clone(),
            chain_id: genesis.chain_id(),
            genesis_time: genesis.initial_timestamp,
            registry: EvaluatorRegistry::standard(),
            fork_db: ForkDatabase::new(),
            block_log,
            pending_tx: Vec::new(),
            popped_tx: VecDeque::new(),
            pending_session_open: false,
            undo_floor: 0,
        };
        db.apply_genesis(genesis);
        db.replay_block_log()?;
        Ok(db)
    }

    // ------------------------------------------------------------------
    // Genesis and replay
    // ------------------------------------------------------------------

    /// Seeds the empty state from the genesis document. Runs with no undo
    /// session open, so everything created here is permanent.
    fn apply_genesis(&mut self, genesis: &GenesisState) {
        assert_eq!(self.state.session_depth(), 0, "genesis needs a fresh state");
        let now = genesis.initial_timestamp;

        for entry in &genesis.accounts {
            let authority = Authority::single_key(entry.public_key);
            self.state.accounts.create(|id| Account {
                id,
                name: entry.name.clone(),
                memo_key: entry.public_key,
                owner: authority.clone(),
                active: authority.clone(),
                posting: authority.clone(),
                balance: entry.balance,
                created: now,
                last_owner_update: now,
                ..Account::default()
            });
            let group_id = self
                .state
                .research_groups
                .create(|id| ResearchGroup {
                    id,
                    name: entry.name.clone(),
                    permlink: entry.name.clone(),
                    description: String::new(),
                    quorum_percent: FULL_PERCENT,
                    balance: Tokens::ZERO,
                    total_tokens_amount: GROUP_SHARE_UNITS,
                    is_personal: true,
                })
                .id;
            self.state
                .research_group_tokens
                .create(|id| ResearchGroupToken {
                    id,
                    research_group_id: group_id,
                    owner: entry.name.clone(),
                    amount: GROUP_SHARE_UNITS,
                });
        }

        let mut shuffled = Vec::new();
        for candidate in &genesis.witness_candidates {
            self.state.witnesses.create(|id| Witness {
                id,
                owner: candidate.owner.clone(),
                signing_key: candidate.signing_key,
                schedule: ScheduleKind::TopVoted,
                running_version: BLOCKCHAIN_VERSION,
                hardfork_time_vote: now,
                created: now,
                ..Witness::default()
            });
            if (shuffled.len() as u32) < self.constants.max_witnesses {
                shuffled.push(candidate.owner.clone());
            }
        }
        let num_scheduled = shuffled.len() as u8;
        let pay_normalization =
            (shuffled.len() as i64 * i64::from(self.constants.top_witness_pay_weight)).max(1);
        self.state.witness_schedule.create(|id| WitnessSchedule {
            id,
            current_shuffled_witnesses: shuffled.clone(),
            num_scheduled_witnesses: num_scheduled,
            next_shuffle_block_num: u32::from(num_scheduled),
            witness_pay_normalization_factor: pay_normalization,
            ..WitnessSchedule::default()
        });

        let current_witness = shuffled.first().cloned().unwrap_or_default();
        let maximum_block_size = self.constants.maximum_block_size;
        self.state.global.create(|id| DynamicGlobalProperties {
            id,
            time: now,
            current_witness,
            current_supply: Tokens::new(genesis.init_supply),
            maximum_block_size,
            // A fresh chain starts with perfect recent participation.
            recent_slots_filled: u128::MAX,
            participation_count: 128,
            ..DynamicGlobalProperties::default()
        });
        self.state.hardforks.create(|id| HardforkProperties {
            id,
            processed_hardfork_times: vec![now],
            ..HardforkProperties::default()
        });

        // The TaPoS ring covers every possible slot from the start.
        for _ in 0..=u64::from(u16::MAX) {
            self.state.block_summaries.create(|id| BlockSummary {
                id,
                block_id: BlockId::default(),
            });
        }

        let mut discipline_ids = std::collections::BTreeMap::new();
        let root = self
            .state
            .disciplines
            .create(|id| Discipline {
                id,
                parent_id: 0,
                name: "common".to_string(),
                total_active_weight: 0,
            })
            .id;
        for entry in &genesis.disciplines {
            let parent_id = if entry.parent.is_empty() {
                root
            } else {
                discipline_ids[entry.parent.as_str()]
            };
            let id = self
                .state
                .disciplines
                .create(|id| Discipline {
                    id,
                    parent_id,
                    name: entry.name.clone(),
                    total_active_weight: 0,
                })
                .id;
            discipline_ids.insert(entry.name.as_str(), id);
        }

        let mut total_expertise = Tokens::ZERO;
        for entry in &genesis.expert_tokens {
            let discipline_id = discipline_ids[entry.discipline.as_str()];
            self.state.expert_tokens.create(|id| ExpertToken {
                id,
                account: entry.account.clone(),
                discipline_id,
                amount: Tokens::new(entry.amount),
                voting_power: FULL_PERCENT,
                last_vote_time: now,
            });
            total_expertise += Tokens::new(entry.amount);
        }
        self.modify_global(|g| g.total_expertise_tokens = total_expertise);

        info!(
            accounts = genesis.accounts.len(),
            witnesses = genesis.witness_candidates.len(),
            supply = genesis.init_supply,
            "genesis state applied"
        );
    }

    /// Replays logged history after a restart. Logged blocks are already
    /// irreversible, so each one's session is committed as soon as it
    /// applies.
    fn replay_block_log(&mut self) -> Result<(), ChainError> {
        let logged = self.block_log.last_block_num();
        if logged == 0 {
            return Ok(());
        }
        info!(blocks = logged, "replaying block log");
        for num in 1..=logged {
            let block = self
                .block_log
                .read_block(num)?
                .expect("indexed blocks are readable");
            self.state.begin_session();
            match self.apply_block(&block, skip::REPLAY) {
                Ok(()) => {
                    // Application itself commits sessions once the
                    // irreversible number catches up; close whatever is
                    // still open and keep the floor accurate so it never
                    // commits a block mid-application.
                    while self.state.session_depth() > 0 {
                        self.state.commit_oldest_session();
                    }
                    self.undo_floor = num;
                }
                Err(e) => {
                    if self.state.session_depth() > 0 {
                        self.state.undo_session();
                    }
                    return Err(e);
                }
            }
        }
        let head = self
            .block_log
            .head()
            .cloned()
            .expect("non-empty log has a head");
        self.fork_db.reset_to(head);
        self.undo_floor = logged;
        // Everything in the log is final; the computed irreversibility
        // number must never fall behind it and allow a logged block to pop.
        self.modify_global(|g| {
            g.last_irreversible_block_num = g.last_irreversible_block_num.max(logged)
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------

    pub fn constants(&self) -> &ChainConstants {
        &self.constants
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn genesis_time(&self) -> ChainTime {
        self.genesis_time
    }

    pub fn get_dynamic_global_properties(&self) -> &DynamicGlobalProperties {
        self.state.global.get(0).expect("global singleton exists")
    }

    pub(crate) fn witness_schedule(&self) -> &WitnessSchedule {
        self.state
            .witness_schedule
            .get(0)
            .expect("witness schedule singleton exists")
    }

    pub(crate) fn hardfork_properties(&self) -> &HardforkProperties {
        self.state
            .hardforks
            .get(0)
            .expect("hardfork singleton exists")
    }

    pub fn head_block_num(&self) -> u32 {
        self.get_dynamic_global_properties().head_block_number
    }

    pub fn head_block_id(&self) -> BlockId {
        self.get_dynamic_global_properties().head_block_id
    }

    pub fn head_block_time(&self) -> ChainTime {
        self.get_dynamic_global_properties().time
    }

    /// Fetches a block from the fork window or, failing that, the log.
    pub fn fetch_block_by_id(&self, id: &BlockId) -> Result<Option<SignedBlock>, ChainError> {
        if let Some(item) = self.fork_db.get(id) {
            return Ok(Some(item.block.clone()));
        }
        match self.block_log.read_block(id.block_num())? {
            Some(block) if block.id() == *id => Ok(Some(block)),
            _ => Ok(None),
        }
    }

    /// Fetches the block at `num` on the current main branch.
    pub fn fetch_block_by_number(&self, num: u32) -> Result<Option<SignedBlock>, ChainError> {
        if let Some(item) = self.fork_db.get_on_head_branch(num) {
            return Ok(Some(item.block.clone()));
        }
        self.block_log.read_block(num)
    }

    pub fn find_account(&self, name: &str) -> Option<&Account> {
        self.state.accounts.iter().find(|a| a.name == name)
    }

    pub fn get_account(&self, name: &str) -> Result<&Account, ChainError> {
        self.find_account(name)
            .ok_or_else(|| ChainError::UnknownAccount(name.to_string()))
    }

    pub fn find_witness(&self, owner: &str) -> Option<&Witness> {
        self.state.witnesses.iter().find(|w| w.owner == owner)
    }

    pub fn get_witness(&self, owner: &str) -> Result<&Witness, ChainError> {
        self.find_witness(owner)
            .ok_or_else(|| ChainError::UnknownWitness(owner.to_string()))
    }

    pub fn get_discipline(&self, id: DisciplineId) -> Result<&Discipline, ChainError> {
        self.state.disciplines.get(id).ok_or_else(|| {
            ChainError::rejected(format!("discipline {id} does not exist"))
        })
    }

    pub fn get_research(&self, id: ResearchId) -> Result<&Research, ChainError> {
        self.state
            .researches
            .get(id)
            .ok_or_else(|| ChainError::rejected(format!("research {id} does not exist")))
    }

    pub fn get_research_content(
        &self,
        id: ResearchContentId,
    ) -> Result<&ResearchContent, ChainError> {
        self.state
            .research_contents
            .get(id)
            .ok_or_else(|| ChainError::rejected(format!("research content {id} does not exist")))
    }

    pub fn get_research_group(&self, id: ResearchGroupId) -> Result<&ResearchGroup, ChainError> {
        self.state
            .research_groups
            .get(id)
            .ok_or_else(|| ChainError::rejected(format!("research group {id} does not exist")))
    }

    pub fn get_review(&self, id: ReviewId) -> Result<&Review, ChainError> {
        self.state
            .reviews
            .get(id)
            .ok_or_else(|| ChainError::rejected(format!("review {id} does not exist")))
    }

    pub fn get_research_token_sale(&self, id: TokenSaleId) -> Result<&TokenSale, ChainError> {
        self.state
            .token_sales
            .get(id)
            .ok_or_else(|| ChainError::rejected(format!("token sale {id} does not exist")))
    }

    pub fn find_expert_token(
        &self,
        account: &str,
        discipline_id: DisciplineId,
    ) -> Option<&ExpertToken> {
        self.state
            .expert_tokens
            .iter()
            .find(|t| t.discipline_id == discipline_id && t.account == account)
    }

    pub fn get_expert_token(
        &self,
        account: &str,
        discipline_id: DisciplineId,
    ) -> Result<&ExpertToken, ChainError> {
        self.find_expert_token(account, discipline_id).ok_or_else(|| {
            ChainError::rejected(format!(
                "`{account}` holds no expertise in discipline {discipline_id}"
            ))
        })
    }

    pub fn find_research_group_token(
        &self,
        group_id: ResearchGroupId,
        owner: &str,
    ) -> Option<&ResearchGroupToken> {
        self.state
            .research_group_tokens
            .iter()
            .find(|t| t.research_group_id == group_id && t.owner == owner)
    }

    pub fn find_research_token(
        &self,
        account: &str,
        research_id: ResearchId,
    ) -> Option<&ResearchToken> {
        self.state
            .research_tokens
            .iter()
            .find(|t| t.research_id == research_id && t.account == account)
    }

    // ------------------------------------------------------------------
    // Slot arithmetic
    // ------------------------------------------------------------------

    /// Wall time of production slot `slot` counted from the head block;
    /// slot 0 is the (already produced) head slot.
    pub fn get_slot_time(&self, slot: u32) -> ChainTime {
        if slot == 0 {
            return ChainTime::ZERO;
        }
        let interval = self.constants.block_interval_secs;
        if self.head_block_num() == 0 {
            // Before the first block every slot is anchored at genesis.
            return self.genesis_time.saturating_add(slot * interval);
        }
        let head_secs = self.head_block_time().secs();
        let head_slot_time = ChainTime::from_secs(head_secs - head_secs % interval);
        head_slot_time.saturating_add(slot * interval)
    }

    /// The slot number `when` falls into, 0 when it is at or before the
    /// head slot.
    pub fn get_slot_at_time(&self, when: ChainTime) -> u32 {
        let first_slot_time = self.get_slot_time(1);
        if when < first_slot_time {
            return 0;
        }
        when.secs_since(first_slot_time) / self.constants.block_interval_secs + 1
    }

    /// The witness owning production slot `slot`.
    pub fn get_scheduled_witness(&self, slot: u32) -> AccountName {
        let schedule = self.witness_schedule();
        let slots = u64::from(schedule.num_scheduled_witnesses).max(1);
        let aslot = self.get_dynamic_global_properties().current_aslot + u64::from(slot);
        schedule.current_shuffled_witnesses[(aslot % slots) as usize].clone()
    }

    // ------------------------------------------------------------------
    // State mutation helpers
    // ------------------------------------------------------------------

    pub(crate) fn modify_global(&mut self, mutate: impl FnOnce(&mut DynamicGlobalProperties)) {
        self.state
            .global
            .modify(0, mutate)
            .expect("global singleton exists")
    }

    pub(crate) fn modify_account(
        &mut self,
        name: &str,
        mutate: impl FnOnce(&mut Account),
    ) -> Result<(), ChainError> {
        let id = self.get_account(name)?.id;
        self.state.accounts.modify(id, mutate)?;
        Ok(())
    }

    pub(crate) fn modify_witness(
        &mut self,
        owner: &str,
        mutate: impl FnOnce(&mut Witness),
    ) -> Result<(), ChainError> {
        let id = self.get_witness(owner)?.id;
        self.state.witnesses.modify(id, mutate)?;
        Ok(())
    }

    /// Moves liquid currency in or out of an account, failing on overdraft.
    pub(crate) fn adjust_balance(&mut self, name: &str, delta: Tokens) -> Result<(), ChainError> {
        let account = self.get_account(name)?;
        let new_balance = account.balance.checked_add(delta)?;
        if new_balance.is_negative() {
            return Err(ChainError::InsufficientBalance {
                account: name.to_string(),
                available: account.balance.amount(),
                required: -delta.amount(),
            });
        }
        let id = account.id;
        self.state
            .accounts
            .modify(id, |a| a.balance = new_balance)?;
        Ok(())
    }

    /// Grows an account's common tokens together with the chain-wide fund.
    /// Does not touch the supply; callers move or mint the currency side.
    pub(crate) fn increase_common_tokens(
        &mut self,
        name: &str,
        amount: Tokens,
    ) -> Result<(), ChainError> {
        debug_assert!(!amount.is_negative());
        self.modify_account(name, |a| a.common_tokens += amount)?;
        self.modify_global(|g| {
            g.common_tokens_fund += amount;
            g.total_common_tokens += amount;
        });
        Ok(())
    }

    pub(crate) fn decrease_common_tokens(
        &mut self,
        name: &str,
        amount: Tokens,
    ) -> Result<(), ChainError> {
        debug_assert!(!amount.is_negative());
        let account = self.get_account(name)?;
        if account.common_tokens < amount {
            return Err(ChainError::InsufficientBalance {
                account: name.to_string(),
                available: account.common_tokens.amount(),
                required: amount.amount(),
            });
        }
        self.modify_account(name, |a| a.common_tokens -= amount)?;
        self.modify_global(|g| {
            g.common_tokens_fund -= amount;
            g.total_common_tokens -= amount;
        });
        Ok(())
    }

    pub(crate) fn adjust_supply(&mut self, delta: Tokens) -> Result<(), ChainError> {
        let new_supply = self
            .get_dynamic_global_properties()
            .current_supply
            .checked_add(delta)?;
        self.modify_global(|g| g.current_supply = new_supply);
        Ok(())
    }

    /// Weight an account's witness approvals carry: its own common tokens
    /// plus the common tokens of accounts proxying to it.
    pub(crate) fn witness_vote_weight(&self, account: &Account) -> i64 {
        let mut weight = account.common_tokens.amount();
        for other in self.state.accounts.iter() {
            if !other.proxy.is_empty() && other.proxy == account.name {
                weight += other.common_tokens.amount();
            }
        }
        weight
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Runs `f` inside a nested undo session, squashing it into the parent
    /// on success and discarding it on error. Callers are always at least
    /// one session deep.
    pub(crate) fn with_session<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ChainError>,
    ) -> Result<T, ChainError> {
        self.state.begin_session();
        match f(self) {
            Ok(value) => {
                self.state.squash_session();
                Ok(value)
            }
            Err(e) => {
                self.state.undo_session();
                Err(e)
            }
        }
    }

    /// Closes the pending-transaction session and hands back its contents.
    pub(crate) fn take_pending(&mut self) -> Vec<SignedTransaction> {
        if self.pending_session_open {
            self.state.undo_session();
            self.pending_session_open = false;
        }
        std::mem::take(&mut self.pending_tx)
    }

    /// Reopens the pending session and replays popped-then-pending
    /// transactions, silently dropping the ones the new chain state
    /// rejects.
    pub(crate) fn restore_pending(&mut self, pending: Vec<SignedTransaction>, skip_flags: u32) {
        debug_assert!(!self.pending_session_open);
        self.state.begin_session();
        self.pending_session_open = true;
        let queued: Vec<SignedTransaction> =
            self.popped_tx.drain(..).chain(pending).collect();
        for tx in queued {
            let id = tx.id();
            match self.with_session(|db| db.apply_transaction(&tx, skip_flags)) {
                Ok(()) => self.pending_tx.push(tx),
                Err(e) => {
                    debug!(tx = %id, error = %e, "dropped pending transaction");
                }
            }
        }
    }

    pub(crate) fn ensure_pending_session(&mut self) {
        if !self.pending_session_open {
            let pending = std::mem::take(&mut self.pending_tx);
            self.restore_pending(pending, skip::NOTHING);
        }
    }

    pub(crate) fn registry(&self) -> &EvaluatorRegistry {
        &self.registry
    }

    pub(crate) fn advance_undo_floor_to(&mut self, target: u32) {
        while self.undo_floor < target && self.state.session_depth() > 0 {
            self.state.commit_oldest_session();
            self.undo_floor += 1;
        }
    }

    pub(crate) fn undo_floor(&self) -> u32 {
        self.undo_floor
    }

    pub(crate) fn block_log(&self) -> &BlockLog {
        &self.block_log
    }

    pub(crate) fn block_log_mut(&mut self) -> &mut BlockLog {
        &mut self.block_log
    }

    pub(crate) fn record_popped_transactions(&mut self, block: &SignedBlock) {
        for tx in block.transactions.iter().rev() {
            self.popped_tx.push_front(tx.clone());
        }
    }

    // ------------------------------------------------------------------
    // Conservation invariants
    // ------------------------------------------------------------------

    /// Full-scan conservation check, run at the end of every applied block
    /// unless skipped. A violation is a bug, never an input error.
    pub(crate) fn validate_invariants(&self) {
        let global = self.get_dynamic_global_properties();

        let mut balances = Tokens::ZERO;
        let mut common = Tokens::ZERO;
        for account in self.state.accounts.iter() {
            balances += account.balance;
            common += account.common_tokens;
        }
        let grant_escrow: Tokens = self.state.grants.iter().map(|g| g.balance).sum();
        let group_balances: Tokens = self.state.research_groups.iter().map(|g| g.balance).sum();
        let pool_escrow: Tokens = self
            .state
            .reward_pools
            .iter()
            .map(|p| p.reward_share)
            .sum();
        let contributions: Tokens = self
            .state
            .sale_contributions
            .iter()
            .map(|c| c.amount)
            .sum();

        let accounted = balances
            + grant_escrow
            + group_balances
            + pool_escrow
            + contributions
            + global.common_tokens_fund;
        assert_eq!(
            global.current_supply, accounted,
            "supply conservation violated at block {}",
            global.head_block_number
        );
        assert_eq!(
            global.total_common_tokens, common,
            "common-token conservation violated at block {}",
            global.head_block_number
        );

        let expertise: Tokens = self.state.expert_tokens.iter().map(|t| t.amount).sum();
        assert_eq!(
            global.total_expertise_tokens, expertise,
            "expertise conservation violated at block {}",
            global.head_block_number
        );

        for discipline in self.state.disciplines.iter() {
            let active_weight: i64 = self
                .state
                .total_votes
                .iter()
                .filter(|tv| {
                    tv.discipline_id == discipline.id
                        && self
                            .state
                            .research_contents
                            .get(tv.research_content_id)
                            .is_some_and(|c| c.is_active())
                })
                .map(|tv| tv.total_weight)
                .sum();
            assert_eq!(
                discipline.total_active_weight, active_weight,
                "active weight out of sync for discipline {}",
                discipline.id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{dev_db, dev_genesis};

    use super::*;

    #[test]
    fn genesis_seeds_the_expected_state() {
        let db = dev_db();
        let global = db.get_dynamic_global_properties();
        assert_eq!(global.head_block_number, 0);
        assert_eq!(global.current_supply, Tokens::new(1_000_000));
        assert_eq!(global.participation_count, 128);
        assert_eq!(db.state.block_summaries.len(), 65_536);

        // Every account gets a personal group holding all of its shares.
        let alice = db.get_account("alice").unwrap();
        assert!(alice.balance.is_positive());
        let group = db
            .state
            .research_groups
            .iter()
            .find(|g| g.is_personal && g.name == "alice")
            .unwrap();
        assert_eq!(group.total_tokens_amount, GROUP_SHARE_UNITS);
        let token = db.find_research_group_token(group.id, "alice").unwrap();
        assert_eq!(token.amount, GROUP_SHARE_UNITS);

        // Discipline 0 is the common root; genesis disciplines follow.
        assert_eq!(db.get_discipline(0).unwrap().name, "common");
        assert!(db.state.disciplines.len() > 1);

        db.validate_invariants();
    }

    #[test]
    fn chain_id_commits_to_the_genesis_document() {
        let (genesis, _) = dev_genesis();
        let db = dev_db();
        assert_eq!(db.chain_id(), genesis.chain_id());
    }

    #[test]
    fn slot_arithmetic_before_any_block() {
        let db = dev_db();
        let interval = db.constants().block_interval_secs;
        let genesis_time = db.genesis_time();
        assert_eq!(db.get_slot_time(1), genesis_time.saturating_add(interval));
        assert_eq!(db.get_slot_at_time(genesis_time), 0);
        assert_eq!(
            db.get_slot_at_time(genesis_time.saturating_add(interval)),
            1
        );
        assert_eq!(
            db.get_slot_at_time(genesis_time.saturating_add(5 * interval)),
            5
        );
    }

    #[test]
    fn balance_adjustments_guard_overdraft() {
        let mut db = dev_db();
        let before = db.get_account("alice").unwrap().balance;
        db.adjust_balance("alice", Tokens::new(-before.amount() - 1))
            .unwrap_err();
        db.adjust_balance("alice", Tokens::new(5)).unwrap();
        assert_eq!(
            db.get_account("alice").unwrap().balance,
            before + Tokens::new(5)
        );
    }

    #[test]
    fn common_token_moves_update_the_fund() {
        let mut db = dev_db();
        db.increase_common_tokens("alice", Tokens::new(40)).unwrap();
        let global = db.get_dynamic_global_properties();
        assert_eq!(global.common_tokens_fund, Tokens::new(40));
        assert_eq!(global.total_common_tokens, Tokens::new(40));

        db.decrease_common_tokens("alice", Tokens::new(15)).unwrap();
        assert_eq!(
            db.get_account("alice").unwrap().common_tokens,
            Tokens::new(25)
        );
        assert!(db
            .decrease_common_tokens("alice", Tokens::new(100))
            .is_err());
    }
}
