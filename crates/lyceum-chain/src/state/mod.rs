//! Chain state schema: every consensus entity as a row in a versioned table.
//!
//! [`State`] owns one [`Table`] per entity and fans session control out to
//! all of them, so a block or transaction session opens, undoes, squashes,
//! and commits atomically across the whole schema. Singletons (global
//! properties, the witness schedule, hardfork bookkeeping) are single-row
//! tables at id 0.

mod account;
mod funding;
mod global;
mod group;
mod research;
mod review;
mod system;
mod witness;

pub use account::{Account, AccountRecoveryRequest, RecoveryAccountChangeRequest};
pub use funding::{Grant, SaleContribution, TokenSale, TokenSaleStatus};
pub use global::{DynamicGlobalProperties, HardforkProperties};
pub use group::{Invite, Proposal, ProposalVote, ResearchGroup, ResearchGroupToken, ResearchToken};
pub use research::{ActivityState, Discipline, Research, ResearchContent, ResearchDisciplineRelation};
pub use review::{ContentRewardPool, ExpertToken, Review, ReviewVote, TotalVotes};
pub use system::{BlockSummary, TransactionDedup};
pub use witness::{ScheduleKind, Witness, WitnessSchedule, WitnessVote};

use lyceum_store::Table;

macro_rules! for_each_table {
    ($state:expr, $method:ident) => {{
        $state.global.$method();
        $state.hardforks.$method();
        $state.accounts.$method();
        $state.witnesses.$method();
        $state.witness_votes.$method();
        $state.witness_schedule.$method();
        $state.disciplines.$method();
        $state.expert_tokens.$method();
        $state.research_groups.$method();
        $state.research_group_tokens.$method();
        $state.researches.$method();
        $state.research_discipline_relations.$method();
        $state.research_contents.$method();
        $state.research_tokens.$method();
        $state.total_votes.$method();
        $state.reviews.$method();
        $state.review_votes.$method();
        $state.reward_pools.$method();
        $state.token_sales.$method();
        $state.sale_contributions.$method();
        $state.proposals.$method();
        $state.proposal_votes.$method();
        $state.invites.$method();
        $state.grants.$method();
        $state.recovery_requests.$method();
        $state.recovery_changes.$method();
        $state.tx_dedup.$method();
        $state.block_summaries.$method();
    }};
}

/// The full consensus state.
#[derive(Default)]
pub struct State {
    pub global: Table<DynamicGlobalProperties>,
    pub hardforks: Table<HardforkProperties>,
    pub accounts: Table<Account>,
    pub witnesses: Table<Witness>,
    pub witness_votes: Table<WitnessVote>,
    pub witness_schedule: Table<WitnessSchedule>,
    pub disciplines: Table<Discipline>,
    pub expert_tokens: Table<ExpertToken>,
    pub research_groups: Table<ResearchGroup>,
    pub research_group_tokens: Table<ResearchGroupToken>,
    pub researches: Table<Research>,
    pub research_discipline_relations: Table<ResearchDisciplineRelation>,
    pub research_contents: Table<ResearchContent>,
    pub research_tokens: Table<ResearchToken>,
    pub total_votes: Table<TotalVotes>,
    pub reviews: Table<Review>,
    pub review_votes: Table<ReviewVote>,
    pub reward_pools: Table<ContentRewardPool>,
    pub token_sales: Table<TokenSale>,
    pub sale_contributions: Table<SaleContribution>,
    pub proposals: Table<Proposal>,
    pub proposal_votes: Table<ProposalVote>,
    pub invites: Table<Invite>,
    pub grants: Table<Grant>,
    pub recovery_requests: Table<AccountRecoveryRequest>,
    pub recovery_changes: Table<RecoveryAccountChangeRequest>,
    pub tx_dedup: Table<TransactionDedup>,
    pub block_summaries: Table<BlockSummary>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens one undo level across every table.
    pub fn begin_session(&mut self) {
        for_each_table!(self, begin_level);
    }

    /// Discards the newest session across every table.
    pub fn undo_session(&mut self) {
        for_each_table!(self, undo_level);
    }

    /// Merges the newest session into its parent across every table.
    pub fn squash_session(&mut self) {
        for_each_table!(self, squash_level);
    }

    /// Makes the oldest open session permanent across every table.
    pub fn commit_oldest_session(&mut self) {
        for_each_table!(self, commit_oldest);
    }

    /// Number of open sessions. Identical for every table since all level
    /// transitions fan out through this aggregate.
    pub fn session_depth(&self) -> usize {
        self.global.level_depth()
    }
}

#[cfg(test)]
mod tests {
    use lyceum_types::Tokens;

    use super::*;

    fn state_with_account(name: &str) -> State {
        let mut state = State::new();
        state.accounts.create(|id| Account {
            id,
            name: name.to_string(),
            ..Account::default()
        });
        state
    }

    #[test]
    fn sessions_fan_out_across_tables() {
        let mut state = state_with_account("alice");

        state.begin_session();
        state
            .accounts
            .modify(0, |a| a.balance = Tokens::new(50))
            .unwrap();
        state.disciplines.create(|id| Discipline {
            id,
            parent_id: 0,
            name: "physics".to_string(),
            total_active_weight: 0,
        });
        assert_eq!(state.session_depth(), 1);

        state.undo_session();
        assert_eq!(state.accounts.get(0).unwrap().balance, Tokens::ZERO);
        assert!(state.disciplines.is_empty());
        assert_eq!(state.session_depth(), 0);
    }

    #[test]
    fn squash_collapses_two_sessions_into_one() {
        let mut state = state_with_account("alice");

        state.begin_session();
        state.begin_session();
        state
            .accounts
            .modify(0, |a| a.balance = Tokens::new(7))
            .unwrap();
        state.squash_session();
        assert_eq!(state.session_depth(), 1);

        state.undo_session();
        assert_eq!(state.accounts.get(0).unwrap().balance, Tokens::ZERO);
    }
}
