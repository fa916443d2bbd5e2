//! Protocol constants and their genesis-time overrides.

use lyceum_types::{ResearchContentKind, Version};
use serde::{Deserialize, Serialize};

/// Version this node implements, reported in produced block headers when it
/// differs from the witness's recorded running version.
pub const BLOCKCHAIN_VERSION: Version = Version::new(0, 1, 0);

/// Consensus timing and economic parameters.
///
/// Every value can be overridden by the genesis document, which is how tests
/// shrink multi-day schedules to a handful of blocks. After genesis the
/// values are fixed for the life of the chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConstants {
    // ---- block production ----
    pub block_interval_secs: u32,
    pub maximum_block_size: u32,
    pub max_witnesses: u32,
    pub max_voted_witnesses: u32,
    pub max_timeshare_witnesses: u32,
    pub top_witness_pay_weight: u32,
    pub timeshare_pay_weight: u32,
    pub hardfork_required_witnesses: u32,
    pub irreversible_threshold: u16,
    pub start_miner_voting_block: u32,
    pub witness_missed_blocks_threshold: u32,
    pub max_witness_votes_per_account: u16,

    // ---- transactions ----
    pub max_time_until_expiration_secs: u32,

    // ---- emission and rewards ----
    pub inflation_rate_start: u16,
    pub inflation_rate_floor: u16,
    pub inflation_narrowing_blocks: u32,
    pub contribution_reward_percent: u16,
    pub review_pool_percent: u16,
    pub curators_reward_percent: u16,
    pub references_reward_percent: u16,

    // ---- expertise voting ----
    pub vote_regeneration_secs: u32,
    pub review_vote_spread_denominator: i64,
    pub reverse_auction_window_secs: u32,

    // ---- review activity windows ----
    pub regular_review_window_secs: u32,
    pub final_review_window_secs: u32,
    pub regular_round_two_gap_secs: u32,
    pub regular_round_two_window_secs: u32,
    pub final_round_two_gap_secs: u32,
    pub final_round_two_window_secs: u32,
    pub final_round_three_gap_secs: u32,
    pub final_round_three_window_secs: u32,

    // ---- common-token withdrawals ----
    pub common_tokens_withdraw_intervals: u32,
    pub common_tokens_withdraw_interval_secs: u32,

    // ---- account recovery ----
    pub owner_update_limit_secs: u32,
    pub recovery_request_expiration_secs: u32,
    pub recovery_account_delay_secs: u32,

    // ---- groups, proposals, grants ----
    pub invite_expiration_secs: u32,
    pub min_proposal_lifetime_secs: u32,
    pub max_proposal_lifetime_secs: u32,
    pub review_share_update_interval_secs: u32,
    pub max_grants_per_account: u32,
    pub min_grant_per_block: i64,
}

impl Default for ChainConstants {
    fn default() -> Self {
        const DAY_SECS: u32 = 24 * 60 * 60;
        const BLOCKS_PER_DAY: u32 = DAY_SECS / 3;
        Self {
            block_interval_secs: 3,
            maximum_block_size: lyceum_types::MIN_BLOCK_SIZE_LIMIT * 2,
            max_witnesses: 21,
            max_voted_witnesses: 20,
            max_timeshare_witnesses: 1,
            top_witness_pay_weight: 1,
            timeshare_pay_weight: 5,
            hardfork_required_witnesses: 17,
            irreversible_threshold: 7_500,
            start_miner_voting_block: 30 * BLOCKS_PER_DAY,
            witness_missed_blocks_threshold: BLOCKS_PER_DAY / 2,
            max_witness_votes_per_account: 30,

            max_time_until_expiration_secs: 60 * 60,

            inflation_rate_start: 978,
            inflation_rate_floor: 95,
            inflation_narrowing_blocks: 250_000,
            contribution_reward_percent: 9_700,
            review_pool_percent: 500,
            curators_reward_percent: 500,
            references_reward_percent: 1_000,

            vote_regeneration_secs: 5 * DAY_SECS,
            review_vote_spread_denominator: 10,
            reverse_auction_window_secs: 30 * 60,

            regular_review_window_secs: 5 * 60,
            final_review_window_secs: 10 * 60,
            regular_round_two_gap_secs: 14 * DAY_SECS,
            regular_round_two_window_secs: 7 * DAY_SECS,
            final_round_two_gap_secs: 60 * DAY_SECS,
            final_round_two_window_secs: 30 * DAY_SECS,
            final_round_three_gap_secs: 182 * DAY_SECS,
            final_round_three_window_secs: 14 * DAY_SECS,

            common_tokens_withdraw_intervals: 13,
            common_tokens_withdraw_interval_secs: 7 * DAY_SECS,

            owner_update_limit_secs: 60 * 60,
            recovery_request_expiration_secs: DAY_SECS,
            recovery_account_delay_secs: 30 * DAY_SECS,

            invite_expiration_secs: 14 * DAY_SECS,
            min_proposal_lifetime_secs: DAY_SECS,
            max_proposal_lifetime_secs: 10 * DAY_SECS,
            review_share_update_interval_secs: 90 * DAY_SECS,
            max_grants_per_account: 5,
            min_grant_per_block: 1,
        }
    }
}

impl ChainConstants {
    pub fn blocks_per_day(&self) -> u32 {
        24 * 60 * 60 / self.block_interval_secs
    }

    pub fn blocks_per_year(&self) -> u32 {
        365 * 24 * 60 * 60 / self.block_interval_secs
    }

    /// Pay-weight normalization for the witness schedule: the sum of the
    /// per-slot weights over a full round.
    pub fn witness_pay_normalization(&self) -> i64 {
        i64::from(self.max_voted_witnesses * self.top_witness_pay_weight)
            + i64::from(self.max_timeshare_witnesses * self.timeshare_pay_weight)
    }

    /// Review-window schedule for `kind`. Returns the gap after the previous
    /// round's close and the window duration for `round` (1-based), or
    /// `None` once the content has no further rounds.
    pub fn activity_round(&self, kind: ResearchContentKind, round: u16) -> Option<(u32, u32)> {
        if kind.is_final_result() {
            match round {
                1 => Some((0, self.final_review_window_secs)),
                2 => Some((self.final_round_two_gap_secs, self.final_round_two_window_secs)),
                3 => Some((
                    self.final_round_three_gap_secs,
                    self.final_round_three_window_secs,
                )),
                _ => None,
            }
        } else {
            match round {
                1 => Some((0, self.regular_review_window_secs)),
                2 => Some((
                    self.regular_round_two_gap_secs,
                    self.regular_round_two_window_secs,
                )),
                _ => None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let c = ChainConstants::default();
        assert_eq!(c.blocks_per_day(), 28_800);
        assert_eq!(c.blocks_per_year(), 10_512_000);
        assert_eq!(c.start_miner_voting_block, 30 * c.blocks_per_day());
        assert_eq!(c.witness_pay_normalization(), 25);
        assert_eq!(
            c.max_witnesses,
            c.max_voted_witnesses + c.max_timeshare_witnesses
        );
    }

    #[test]
    fn partial_override_keeps_remaining_defaults() {
        let c: ChainConstants =
            serde_json::from_str(r#"{ "block_interval_secs": 1, "max_witnesses": 3 }"#).unwrap();
        assert_eq!(c.block_interval_secs, 1);
        assert_eq!(c.max_witnesses, 3);
        assert_eq!(c.irreversible_threshold, 7_500);
    }

    #[test]
    fn final_results_get_three_rounds() {
        let c = ChainConstants::default();
        assert_eq!(
            c.activity_round(ResearchContentKind::FinalResult, 1),
            Some((0, 600))
        );
        assert!(c.activity_round(ResearchContentKind::FinalResult, 3).is_some());
        assert!(c.activity_round(ResearchContentKind::FinalResult, 4).is_none());
        assert_eq!(
            c.activity_round(ResearchContentKind::Announcement, 1),
            Some((0, 300))
        );
        assert!(c.activity_round(ResearchContentKind::Announcement, 3).is_none());
    }
}
