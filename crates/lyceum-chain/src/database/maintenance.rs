//! End-of-block maintenance: the fixed processing sequence that runs after
//! a block's transactions have applied.

use tracing::{debug, info, warn};

use lyceum_types::{AccountName, ChainTime, PublicKey, SignedBlock, Tokens};

use crate::error::ChainError;
use crate::state::BlockSummary;

use super::Database;

impl Database {
    /// Moves the head trackers onto the new block and accounts for the
    /// production slots that went empty since the previous one: missed
    /// witnesses accumulate strikes (losing their signing key past the
    /// threshold once miner voting is live) and the participation bitmap
    /// records a zero per empty slot.
    pub(crate) fn update_global_dynamic_data(
        &mut self,
        block: &SignedBlock,
    ) -> Result<(), ChainError> {
        let missed = if self.head_block_num() == 0 {
            0
        } else {
            self.get_slot_at_time(block.header.timestamp).saturating_sub(1)
        };

        let head = self.head_block_num();
        let voting_live = head >= self.constants().start_miner_voting_block;
        let miss_threshold = self.constants().witness_missed_blocks_threshold;
        for slot in 0..missed {
            let absent = self.get_scheduled_witness(slot + 1);
            if absent == block.header.witness {
                continue;
            }
            if let Some(id) = self.find_witness(&absent).map(|w| w.id) {
                self.state.witnesses.modify(id, |w| {
                    w.total_missed += 1;
                    if voting_live && head.saturating_sub(w.last_confirmed_block_num) > miss_threshold
                    {
                        warn!(witness = %w.owner, "witness lost signing key after missed blocks");
                        w.signing_key = PublicKey([0u8; 32]);
                    }
                })?;
            }
        }

        let block_num = block.block_num();
        let block_id = block.id();
        let timestamp = block.header.timestamp;
        let witness = block.header.witness.clone();
        self.modify_global(|g| {
            g.head_block_number = block_num;
            g.head_block_id = block_id;
            g.time = timestamp;
            g.current_witness = witness;
            g.current_aslot += u64::from(missed) + 1;
            // Shifting by 128 or more would drop every bit anyway.
            g.recent_slots_filled = if missed >= 127 {
                1
            } else {
                (g.recent_slots_filled << (missed + 1)) | 1
            };
            g.participation_count = g.recent_slots_filled.count_ones() as u8;
        });
        Ok(())
    }

    /// Credits the producing witness with this block.
    pub(crate) fn update_signing_witness(&mut self, block: &SignedBlock) -> Result<(), ChainError> {
        let aslot = self.get_dynamic_global_properties().current_aslot;
        let block_num = block.block_num();
        self.modify_witness(&block.header.witness, |w| {
            w.last_aslot = aslot;
            w.last_confirmed_block_num = block_num;
        })
    }

    /// Recomputes the last irreversible block, commits undo levels below
    /// it, appends the newly irreversible stretch to the block log, and
    /// prunes the fork window.
    pub(crate) fn advance_irreversibility(&mut self) -> Result<(), ChainError> {
        let global = self.get_dynamic_global_properties();
        let head = global.head_block_number;
        let current_lib = global.last_irreversible_block_num;

        let schedule = self.witness_schedule();
        let seats = usize::from(schedule.num_scheduled_witnesses).max(1);
        let proposed = if head < self.constants().start_miner_voting_block {
            head.saturating_sub(seats as u32)
        } else {
            let mut confirmed: Vec<u32> = schedule
                .current_shuffled_witnesses
                .iter()
                .map(|name| {
                    self.find_witness(name)
                        .map(|w| w.last_confirmed_block_num)
                        .unwrap_or(0)
                })
                .collect();
            confirmed.sort_unstable();
            let threshold = u32::from(self.constants().irreversible_threshold);
            let offset = (seats - 1) * (10_000 - threshold as usize) / 10_000;
            confirmed[offset]
        };
        let new_lib = proposed.max(current_lib);
        if new_lib > current_lib {
            self.modify_global(|g| g.last_irreversible_block_num = new_lib);
            debug!(lib = new_lib, head, "irreversibility advanced");
        }

        // The newest block's undo level always stays open so the block
        // itself remains poppable until a successor confirms it.
        let commit_to = new_lib.min(head.saturating_sub(1));
        self.advance_undo_floor_to(commit_to);

        while self.block_log().last_block_num() < new_lib {
            let next = self.block_log().last_block_num() + 1;
            let Some(item) = self.fork_db.get_on_head_branch(next).cloned() else {
                break;
            };
            self.block_log_mut().append(&item.block)?;
        }
        self.fork_db.prune_below(new_lib);
        Ok(())
    }

    /// Writes the block id into the TaPoS ring at `block_num mod 65536`.
    pub(crate) fn record_block_summary(&mut self, block: &SignedBlock) -> Result<(), ChainError> {
        let slot = u64::from(block.block_num() & 0xffff);
        let id = block.id();
        self.state
            .block_summaries
            .modify(slot, |s: &mut BlockSummary| s.block_id = id)?;
        Ok(())
    }

    /// Removes rows whose lifetime has lapsed: dedup entries, proposals
    /// (with their votes), group invites, expired grants (refunding the
    /// grantor), and recovery requests; applies recovery-account changes
    /// whose delay has run out.
    pub(crate) fn prune_expired_state(&mut self) -> Result<(), ChainError> {
        let now = self.head_block_time();

        let expired_dedup: Vec<u64> = self
            .state
            .tx_dedup
            .iter()
            .filter(|d| d.expiration <= now)
            .map(|d| d.id)
            .collect();
        for id in expired_dedup {
            self.state.tx_dedup.remove(id)?;
        }

        let expired_proposals: Vec<u64> = self
            .state
            .proposals
            .iter()
            .filter(|p| p.expiration_time <= now)
            .map(|p| p.id)
            .collect();
        for proposal_id in expired_proposals {
            let votes: Vec<u64> = self
                .state
                .proposal_votes
                .iter()
                .filter(|v| v.proposal_id == proposal_id)
                .map(|v| v.id)
                .collect();
            for vote_id in votes {
                self.state.proposal_votes.remove(vote_id)?;
            }
            self.state.proposals.remove(proposal_id)?;
            debug!(proposal = proposal_id, "proposal expired");
        }

        let expired_invites: Vec<u64> = self
            .state
            .invites
            .iter()
            .filter(|i| i.expiration <= now)
            .map(|i| i.id)
            .collect();
        for id in expired_invites {
            self.state.invites.remove(id)?;
        }

        let expired_grants: Vec<(u64, AccountName, Tokens)> = self
            .state
            .grants
            .iter()
            .filter(|g| g.end_time <= now)
            .map(|g| (g.id, g.grantor.clone(), g.balance))
            .collect();
        for (id, grantor, balance) in expired_grants {
            if balance.is_positive() {
                self.adjust_balance(&grantor, balance)?;
            }
            self.state.grants.remove(id)?;
            info!(grant = id, refunded = %balance, "grant expired");
        }

        let expired_requests: Vec<u64> = self
            .state
            .recovery_requests
            .iter()
            .filter(|r| r.expiration <= now)
            .map(|r| r.id)
            .collect();
        for id in expired_requests {
            self.state.recovery_requests.remove(id)?;
        }

        let due_changes: Vec<(u64, AccountName, AccountName)> = self
            .state
            .recovery_changes
            .iter()
            .filter(|c| c.effect_time <= now)
            .map(|c| (c.id, c.account_to_recover.clone(), c.recovery_account.clone()))
            .collect();
        for (id, account, new_partner) in due_changes {
            self.modify_account(&account, |a| a.recovery_account = new_partner)?;
            self.state.recovery_changes.remove(id)?;
        }
        Ok(())
    }

    /// Converts due vesting tranches back to liquid balance.
    pub(crate) fn process_common_token_withdrawals(&mut self) -> Result<(), ChainError> {
        let now = self.head_block_time();
        let interval = self.constants().common_tokens_withdraw_interval_secs;
        let due: Vec<AccountName> = self
            .state
            .accounts
            .iter()
            .filter(|a| a.has_withdraw_schedule() && a.next_common_tokens_withdrawal <= now)
            .map(|a| a.name.clone())
            .collect();
        for name in due {
            let account = self.get_account(name.as_str())?;
            let remaining = account.to_withdraw - account.withdrawn;
            let tranche = account
                .common_tokens_withdraw_rate
                .min(remaining)
                .min(account.common_tokens);
            if tranche.is_positive() {
                self.decrease_common_tokens(&name, tranche)?;
                self.adjust_balance(&name, tranche)?;
            }
            self.modify_account(&name, |a| {
                a.withdrawn += tranche;
                if a.withdrawn >= a.to_withdraw || !a.common_tokens.is_positive() {
                    a.common_tokens_withdraw_rate = Tokens::ZERO;
                    a.next_common_tokens_withdrawal = ChainTime::MAX;
                    a.withdrawn = Tokens::ZERO;
                    a.to_withdraw = Tokens::ZERO;
                } else {
                    a.next_common_tokens_withdrawal =
                        a.next_common_tokens_withdrawal.saturating_add(interval);
                }
            })?;
            debug!(account = %name, amount = %tranche, "vesting tranche released");
        }
        Ok(())
    }

    /// Applies a scheduled hardfork once its activation time arrives.
    pub(crate) fn process_hardforks(&mut self) -> Result<(), ChainError> {
        let now = self.head_block_time();
        let hardforks = self.hardfork_properties();
        let next = hardforks.next_hardfork_version;
        let current = hardforks.current_hardfork_version;
        if next <= current || hardforks.next_hardfork_time > now {
            return Ok(());
        }
        self.state
            .hardforks
            .modify(0, |h| {
                h.current_hardfork_version = next;
                h.processed_hardfork_times.push(now);
            })
            .expect("hardfork singleton exists");
        info!(version = %next, "hardfork applied");
        Ok(())
    }

    /// Pays each running grant's per-block tranche into its discipline's
    /// active-content pools; a grant facing no active content either waits
    /// or, when extendable, pushes its end time out by one block.
    pub(crate) fn distribute_grants(&mut self) -> Result<(), ChainError> {
        let now = self.head_block_time();
        let interval = self.constants().block_interval_secs;
        let running: Vec<(u64, u64, Tokens)> = self
            .state
            .grants
            .iter()
            .filter(|g| g.start_time <= now && g.end_time > now && g.balance.is_positive())
            .map(|g| (g.id, g.target_discipline, g.balance.min(g.per_block)))
            .collect();
        for (grant_id, discipline_id, tranche) in running {
            let has_active_content = self
                .get_discipline(discipline_id)
                .map(|d| d.total_active_weight > 0)
                .unwrap_or(false);
            if !has_active_content {
                let extendable = self
                    .state
                    .grants
                    .get(grant_id)
                    .is_some_and(|g| g.is_extendable);
                if extendable {
                    self.state
                        .grants
                        .modify(grant_id, |g| {
                            g.end_time = g.end_time.saturating_add(interval)
                        })?;
                }
                continue;
            }
            let used = self.reward_researches_in_discipline(discipline_id, tranche, Tokens::ZERO)?;
            if used.is_positive() {
                self.state.grants.modify(grant_id, |g| g.balance -= used)?;
            }
            let exhausted = self
                .state
                .grants
                .get(grant_id)
                .is_some_and(|g| !g.balance.is_positive());
            if exhausted {
                self.state.grants.remove(grant_id)?;
                info!(grant = grant_id, "grant exhausted");
            }
        }
        Ok(())
    }

    pub(crate) fn reset_per_block_counters(&mut self) {
        self.modify_global(|g| {
            g.expertise_minted_this_block = Tokens::ZERO;
            g.expertise_consumed_this_block = Tokens::ZERO;
        });
    }
}
