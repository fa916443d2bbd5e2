//! Emission and the contribution reward engine.
//!
//! Currency flows top-down each block: the emission pot splits across
//! disciplines by active review weight, a small cut pays reviews directly,
//! and the rest accrues into per-(content, discipline) escrow pools that
//! are realized when the content's review window closes. Expertise rides
//! along with the same ratios but is minted only at the moment it lands in
//! an expert token. Floor division everywhere; remainders at a level stay
//! undistributed, so each level uses at most what it was handed.

use std::collections::BTreeSet;

use tracing::{debug, trace};

use lyceum_types::{
    multiply_ratio, percent_of, AccountName, DisciplineId, ResearchContentId, ResearchContentKind,
    ResearchId, ReviewId, Tokens, FULL_PERCENT,
};

use crate::error::ChainError;
use crate::state::{ActivityState, ContentRewardPool, ExpertToken, ScheduleKind, TotalVotes};

use super::Database;

/// Emission rate in basis points at a given block height: narrows by one
/// basis point per narrowing period until it hits the floor.
fn emission_rate_bp(head_block_num: u32, start: u16, floor: u16, narrowing_blocks: u32) -> i64 {
    let narrowed = i64::from(start) - i64::from(head_block_num / narrowing_blocks.max(1));
    narrowed.max(i64::from(floor))
}

/// Modifier-scaled effective weight of one review among the `review_count`
/// reviews of its content carrying weight in a discipline:
///
/// ```text
/// raw * own_e/avg_e  +  raw * 10 * (1 - 1/n) * own_v/total_v
/// ```
///
/// computed exactly in i128 with a single floor division per term. With a
/// single review the result equals the raw expertise spend; the curation
/// term drops out entirely when no positive votes exist.
fn review_weight_modifier(
    own_expertise: i64,
    expertise_sum: i128,
    review_count: i128,
    own_votes: i64,
    votes_sum: i128,
) -> i64 {
    if own_expertise <= 0 || expertise_sum <= 0 || review_count <= 0 {
        return 0;
    }
    let own = i128::from(own_expertise);
    let expertise_term = own * own * review_count / expertise_sum;
    let votes = i128::from(own_votes.max(0));
    let curation_term = if votes_sum > 0 && votes > 0 {
        10 * own * (review_count - 1) * votes / (review_count * votes_sum)
    } else {
        0
    };
    i64::try_from(expertise_term + curation_term).expect("review weight fits in i64")
}

impl Database {
    /// Mints the per-block emission and routes it: the contribution share
    /// into discipline reward distribution, the remainder to the block's
    /// witness as common tokens. The supply grows only by what was
    /// actually placed.
    pub(crate) fn process_funds(&mut self) -> Result<(), ChainError> {
        let global = self.get_dynamic_global_properties();
        let head = global.head_block_number;
        let supply = global.current_supply;
        let witness_name = global.current_witness.clone();

        let rate_bp = emission_rate_bp(
            head,
            self.constants().inflation_rate_start,
            self.constants().inflation_rate_floor,
            self.constants().inflation_narrowing_blocks,
        );
        let per_year = i64::from(FULL_PERCENT) * i64::from(self.constants().blocks_per_year());
        let to_emit = multiply_ratio(supply.amount(), rate_bp, per_year);
        if to_emit <= 0 {
            return Ok(());
        }
        let contribution = percent_of(to_emit, self.constants().contribution_reward_percent);
        let witness_budget = to_emit - contribution;

        let used =
            self.distribute_reward(Tokens::new(contribution), Tokens::new(contribution))?;

        let type_weight = match self.get_witness(&witness_name)?.schedule {
            ScheduleKind::Timeshare => self.constants().timeshare_pay_weight,
            _ => self.constants().top_witness_pay_weight,
        };
        let schedule = self.witness_schedule();
        let seats = i64::from(schedule.num_scheduled_witnesses);
        let normalization = schedule.witness_pay_normalization_factor.max(1);
        let witness_pay = Tokens::new(multiply_ratio(
            witness_budget,
            seats * i64::from(type_weight),
            normalization,
        ));
        if witness_pay.is_positive() {
            self.increase_common_tokens(&witness_name, witness_pay)?;
        }
        self.adjust_supply(used + witness_pay)?;
        trace!(
            block = head,
            emitted = %(used + witness_pay),
            witness_pay = %witness_pay,
            "emission processed"
        );
        Ok(())
    }

    /// Splits a contribution pot across disciplines in proportion to their
    /// active review weight, carving the fixed review-pool cut out of each
    /// share first. Returns the currency actually placed.
    pub(crate) fn distribute_reward(
        &mut self,
        pot: Tokens,
        expertise_pot: Tokens,
    ) -> Result<Tokens, ChainError> {
        if !pot.is_positive() {
            return Ok(Tokens::ZERO);
        }
        let shares: Vec<(DisciplineId, i64)> = self
            .state
            .disciplines
            .iter()
            .filter(|d| d.id != 0 && d.total_active_weight > 0)
            .map(|d| (d.id, d.total_active_weight))
            .collect();
        let total_weight: i64 = shares.iter().map(|(_, w)| w).sum();
        if total_weight <= 0 {
            return Ok(Tokens::ZERO);
        }

        let review_percent = self.constants().review_pool_percent;
        let mut used = Tokens::ZERO;
        for (discipline_id, weight) in shares {
            let share = multiply_ratio(pot.amount(), weight, total_weight);
            let expertise = multiply_ratio(expertise_pot.amount(), weight, total_weight);
            let review_cut = percent_of(share, review_percent);
            let review_expertise = percent_of(expertise, review_percent);
            used += self.reward_discipline_reviews(
                discipline_id,
                Tokens::new(review_cut),
                Tokens::new(review_expertise),
            )?;
            used += self.reward_researches_in_discipline(
                discipline_id,
                Tokens::new(share - review_cut),
                Tokens::new(expertise - review_expertise),
            )?;
        }
        assert!(used <= pot, "distributed more than the emission pot");
        Ok(used)
    }

    /// Pays the per-block review cut straight through to the discipline's
    /// reviews of currently active content.
    fn reward_discipline_reviews(
        &mut self,
        discipline_id: DisciplineId,
        amount: Tokens,
        expertise: Tokens,
    ) -> Result<Tokens, ChainError> {
        if !amount.is_positive() && !expertise.is_positive() {
            return Ok(Tokens::ZERO);
        }
        let reviews: Vec<ReviewId> = self
            .state
            .reviews
            .iter()
            .filter(|r| {
                r.expertise_spent.get(&discipline_id).is_some_and(|e| *e > 0)
                    && self
                        .state
                        .research_contents
                        .get(r.research_content_id)
                        .is_some_and(|c| c.is_active())
            })
            .map(|r| r.id)
            .collect();
        if reviews.is_empty() {
            return Ok(Tokens::ZERO);
        }
        self.allocate_rewards_to_reviews(&reviews, discipline_id, amount, expertise)
    }

    /// Accrues a discipline's content share into per-(content, discipline)
    /// escrow pools, proportional to each content's review weight.
    pub(crate) fn reward_researches_in_discipline(
        &mut self,
        discipline_id: DisciplineId,
        amount: Tokens,
        expertise: Tokens,
    ) -> Result<Tokens, ChainError> {
        let discipline_weight = self.get_discipline(discipline_id)?.total_active_weight;
        if discipline_weight <= 0 || (!amount.is_positive() && !expertise.is_positive()) {
            return Ok(Tokens::ZERO);
        }
        let contents: Vec<(ResearchContentId, i64)> = self
            .state
            .total_votes
            .iter()
            .filter(|tv| {
                tv.discipline_id == discipline_id
                    && tv.total_weight > 0
                    && self
                        .state
                        .research_contents
                        .get(tv.research_content_id)
                        .is_some_and(|c| c.is_active())
            })
            .map(|tv| (tv.research_content_id, tv.total_weight))
            .collect();

        let mut used = Tokens::ZERO;
        for (content_id, weight) in contents {
            let share = multiply_ratio(amount.amount(), weight, discipline_weight);
            let expertise_share = multiply_ratio(expertise.amount(), weight, discipline_weight);
            if share <= 0 && expertise_share <= 0 {
                continue;
            }
            self.accrue_reward_pool(
                content_id,
                discipline_id,
                Tokens::new(share),
                Tokens::new(expertise_share),
            );
            used += Tokens::new(share);
        }
        assert!(used <= amount, "accrued more than the discipline share");
        Ok(used)
    }

    fn accrue_reward_pool(
        &mut self,
        content_id: ResearchContentId,
        discipline_id: DisciplineId,
        amount: Tokens,
        expertise: Tokens,
    ) {
        let existing = self
            .state
            .reward_pools
            .iter()
            .find(|p| p.research_content_id == content_id && p.discipline_id == discipline_id)
            .map(|p| p.id);
        match existing {
            Some(id) => self
                .state
                .reward_pools
                .modify(id, |p| {
                    p.reward_share += amount;
                    p.expertise_share += expertise;
                })
                .expect("pool row exists"),
            None => {
                self.state.reward_pools.create(|id| ContentRewardPool {
                    id,
                    research_content_id: content_id,
                    discipline_id,
                    reward_share: amount,
                    expertise_share: expertise,
                });
            }
        }
    }

    /// Splits a reward among competing reviews by effective weight. Each
    /// review's share pays a curator cut to its voters and the remainder to
    /// its author; expertise shares pay the author in full.
    fn allocate_rewards_to_reviews(
        &mut self,
        reviews: &[ReviewId],
        discipline_id: DisciplineId,
        amount: Tokens,
        expertise: Tokens,
    ) -> Result<Tokens, ChainError> {
        let weights: Vec<(ReviewId, i64)> = reviews
            .iter()
            .map(|&id| (id, self.review_effective_weight(id, discipline_id)))
            .filter(|(_, w)| *w > 0)
            .collect();
        let total_weight: i64 = weights.iter().map(|(_, w)| w).sum();
        if total_weight <= 0 {
            return Ok(Tokens::ZERO);
        }

        let curator_percent = self.constants().curators_reward_percent;
        let mut used = Tokens::ZERO;
        for (review_id, weight) in weights {
            let share = multiply_ratio(amount.amount(), weight, total_weight);
            let expertise_share = multiply_ratio(expertise.amount(), weight, total_weight);
            let author = self
                .state
                .reviews
                .get(review_id)
                .map(|r| r.author.clone())
                .ok_or_else(|| ChainError::rejected(format!("review {review_id} vanished")))?;

            let curator_cut = percent_of(share, curator_percent);
            let voters_paid =
                self.reward_review_voters(review_id, discipline_id, Tokens::new(curator_cut))?;
            let author_amount = Tokens::new(share - curator_cut);
            if author_amount.is_positive() {
                self.adjust_balance(&author, author_amount)?;
            }
            if expertise_share > 0 {
                self.reward_with_expertise(&author, discipline_id, Tokens::new(expertise_share))?;
            }
            used += voters_paid + author_amount;
        }
        assert!(used <= amount, "review rewards exceed their allocation");
        Ok(used)
    }

    /// Pays a review's curator cut to its voters in one discipline, in
    /// proportion to positive vote weight.
    fn reward_review_voters(
        &mut self,
        review_id: ReviewId,
        discipline_id: DisciplineId,
        amount: Tokens,
    ) -> Result<Tokens, ChainError> {
        if !amount.is_positive() {
            return Ok(Tokens::ZERO);
        }
        let voters: Vec<(AccountName, i64)> = self
            .state
            .review_votes
            .iter()
            .filter(|v| {
                v.review_id == review_id && v.discipline_id == discipline_id && v.weight > 0
            })
            .map(|v| (v.voter.clone(), v.weight))
            .collect();
        let total: i64 = voters.iter().map(|(_, w)| w).sum();
        if total <= 0 {
            return Ok(Tokens::ZERO);
        }
        let mut used = Tokens::ZERO;
        for (voter, weight) in voters {
            let cut = Tokens::new(multiply_ratio(amount.amount(), weight, total));
            if cut.is_positive() {
                self.adjust_balance(&voter, cut)?;
                used += cut;
            }
        }
        Ok(used)
    }

    /// Mints expertise into an (account, discipline) expert token, creating
    /// the token on first award.
    pub(crate) fn reward_with_expertise(
        &mut self,
        account: &str,
        discipline_id: DisciplineId,
        amount: Tokens,
    ) -> Result<(), ChainError> {
        if !amount.is_positive() {
            return Ok(());
        }
        let now = self.head_block_time();
        match self.find_expert_token(account, discipline_id).map(|t| t.id) {
            Some(id) => self
                .state
                .expert_tokens
                .modify(id, |t| t.amount += amount)?,
            None => {
                self.state.expert_tokens.create(|id| ExpertToken {
                    id,
                    account: account.to_string(),
                    discipline_id,
                    amount,
                    voting_power: FULL_PERCENT,
                    last_vote_time: now,
                });
            }
        }
        self.modify_global(|g| {
            g.total_expertise_tokens += amount;
            g.expertise_minted_this_block += amount;
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Effective review weights
    // ------------------------------------------------------------------

    pub(crate) fn review_vote_sum(&self, review_id: ReviewId, discipline_id: DisciplineId) -> i64 {
        self.state
            .review_votes
            .iter()
            .filter(|v| v.review_id == review_id && v.discipline_id == discipline_id)
            .map(|v| v.weight)
            .sum()
    }

    /// The review's modifier-scaled weight among its content's reviews in
    /// one discipline.
    pub(crate) fn review_effective_weight(
        &self,
        review_id: ReviewId,
        discipline_id: DisciplineId,
    ) -> i64 {
        let Some(review) = self.state.reviews.get(review_id) else {
            return 0;
        };
        let own_expertise = review
            .expertise_spent
            .get(&discipline_id)
            .copied()
            .unwrap_or(0);
        if own_expertise <= 0 {
            return 0;
        }
        let content_id = review.research_content_id;

        let peers: Vec<(ReviewId, i64)> = self
            .state
            .reviews
            .iter()
            .filter(|r| r.research_content_id == content_id)
            .filter_map(|r| {
                r.expertise_spent
                    .get(&discipline_id)
                    .filter(|e| **e > 0)
                    .map(|e| (r.id, *e))
            })
            .collect();
        let review_count = peers.len() as i128;
        let expertise_sum: i128 = peers.iter().map(|(_, e)| i128::from(*e)).sum();
        let own_votes = self.review_vote_sum(review_id, discipline_id);
        let votes_sum: i128 = peers
            .iter()
            .map(|(id, _)| i128::from(self.review_vote_sum(*id, discipline_id).max(0)))
            .sum();
        review_weight_modifier(own_expertise, expertise_sum, review_count, own_votes, votes_sum)
    }

    /// Recomputes the summed effective weight for (content, discipline) and
    /// folds the delta into the discipline's active weight while the
    /// content's window is open.
    pub(crate) fn recompute_review_weights(
        &mut self,
        content_id: ResearchContentId,
        discipline_id: DisciplineId,
    ) -> Result<(), ChainError> {
        let review_ids: Vec<ReviewId> = self
            .state
            .reviews
            .iter()
            .filter(|r| {
                r.research_content_id == content_id
                    && r.expertise_spent.get(&discipline_id).is_some_and(|e| *e > 0)
            })
            .map(|r| r.id)
            .collect();
        let new_total: i64 = review_ids
            .iter()
            .map(|&id| self.review_effective_weight(id, discipline_id))
            .sum();

        let research_id = self.get_research_content(content_id)?.research_id;
        let existing = self
            .state
            .total_votes
            .iter()
            .find(|tv| tv.research_content_id == content_id && tv.discipline_id == discipline_id)
            .map(|tv| (tv.id, tv.total_weight));
        let old_total = match existing {
            Some((id, old)) => {
                self.state
                    .total_votes
                    .modify(id, |tv| tv.total_weight = new_total)?;
                old
            }
            None => {
                self.state.total_votes.create(|id| TotalVotes {
                    id,
                    research_content_id: content_id,
                    discipline_id,
                    research_id,
                    total_weight: new_total,
                });
                0
            }
        };

        let delta = new_total - old_total;
        if delta != 0 && self.get_research_content(content_id)?.is_active() {
            let discipline = self.get_discipline(discipline_id)?.id;
            self.state
                .disciplines
                .modify(discipline, |d| d.total_active_weight += delta)?;
        }
        trace!(
            content = content_id,
            discipline = discipline_id,
            weight = new_total,
            "review weights recomputed"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Settlement
    // ------------------------------------------------------------------

    /// Realizes a (content, discipline) escrow pool when a review window
    /// closes: a reference cut first, then the research's review share,
    /// then the remainder to the research's token holders. Expertise goes
    /// to reviewers and authors. Drains and removes the pool.
    pub(crate) fn reward_research_content(
        &mut self,
        content_id: ResearchContentId,
        discipline_id: DisciplineId,
    ) -> Result<(), ChainError> {
        let Some((pool_id, currency, expertise)) = self
            .state
            .reward_pools
            .iter()
            .find(|p| p.research_content_id == content_id && p.discipline_id == discipline_id)
            .map(|p| (p.id, p.reward_share, p.expertise_share))
        else {
            return Ok(());
        };
        self.state.reward_pools.remove(pool_id)?;
        if !currency.is_positive() && !expertise.is_positive() {
            return Ok(());
        }

        let content = self.get_research_content(content_id)?;
        let research_id = content.research_id;
        let kind = content.kind;
        let authors = content.authors.clone();
        let references = content.references.clone();
        let review_share_percent = self.get_research(research_id)?.review_share_percent;

        let references_cut = percent_of(
            currency.amount(),
            self.constants().references_reward_percent,
        );
        let references_used =
            self.reward_references(&references, discipline_id, Tokens::new(references_cut))?;

        let review_cut = percent_of(currency.amount(), review_share_percent);
        let review_expertise = percent_of(expertise.amount(), review_share_percent);
        let review_ids: Vec<ReviewId> = self
            .state
            .reviews
            .iter()
            .filter(|r| {
                r.research_content_id == content_id
                    && r.expertise_spent.get(&discipline_id).is_some_and(|e| *e > 0)
            })
            .map(|r| r.id)
            .collect();
        let reviews_used = if review_ids.is_empty() {
            Tokens::ZERO
        } else {
            self.allocate_rewards_to_reviews(
                &review_ids,
                discipline_id,
                Tokens::new(review_cut),
                Tokens::new(review_expertise),
            )?
        };

        // Whatever the reference and review stages left behind belongs to
        // the token holders, so the pool drains exactly.
        let holders_amount = currency - references_used - reviews_used;
        self.reward_research_token_holders(research_id, holders_amount)?;

        let author_expertise = expertise - Tokens::new(review_expertise);
        self.reward_content_authors(research_id, kind, &authors, discipline_id, author_expertise)?;

        debug!(
            content = content_id,
            discipline = discipline_id,
            currency = %currency,
            expertise = %expertise,
            "reward pool settled"
        );
        Ok(())
    }

    /// Pays a reference cut to each referenced content's research token
    /// holders, weighted by the references' own review weight in the
    /// discipline.
    fn reward_references(
        &mut self,
        references: &[ResearchContentId],
        discipline_id: DisciplineId,
        amount: Tokens,
    ) -> Result<Tokens, ChainError> {
        if !amount.is_positive() || references.is_empty() {
            return Ok(Tokens::ZERO);
        }
        let weighted: Vec<(ResearchContentId, i64)> = references
            .iter()
            .filter_map(|&reference| {
                self.state
                    .total_votes
                    .iter()
                    .find(|tv| {
                        tv.research_content_id == reference && tv.discipline_id == discipline_id
                    })
                    .filter(|tv| tv.total_weight > 0)
                    .map(|tv| (reference, tv.total_weight))
            })
            .collect();
        let total: i64 = weighted.iter().map(|(_, w)| w).sum();
        if total <= 0 {
            return Ok(Tokens::ZERO);
        }
        let mut used = Tokens::ZERO;
        for (reference, weight) in weighted {
            let cut = Tokens::new(multiply_ratio(amount.amount(), weight, total));
            if cut.is_positive() {
                let research_id = self.get_research_content(reference)?.research_id;
                used += self.reward_research_token_holders(research_id, cut)?;
            }
        }
        Ok(used)
    }

    /// Splits a payout across a research's token holders by share units;
    /// the group-retained units and any rounding residue go to the owning
    /// group's balance. Always places the full amount.
    pub(crate) fn reward_research_token_holders(
        &mut self,
        research_id: ResearchId,
        amount: Tokens,
    ) -> Result<Tokens, ChainError> {
        if !amount.is_positive() {
            return Ok(Tokens::ZERO);
        }
        let group_id = self.get_research(research_id)?.research_group_id;
        let holders: Vec<(AccountName, i64)> = self
            .state
            .research_tokens
            .iter()
            .filter(|t| t.research_id == research_id && t.amount > 0)
            .map(|t| (t.account.clone(), t.amount))
            .collect();

        let mut paid = Tokens::ZERO;
        for (holder, units) in holders {
            let cut = Tokens::new(multiply_ratio(
                amount.amount(),
                units,
                super::GROUP_SHARE_UNITS,
            ));
            if cut.is_positive() {
                self.adjust_balance(&holder, cut)?;
                paid += cut;
            }
        }
        let group_cut = amount - paid;
        if group_cut.is_positive() {
            self.state
                .research_groups
                .modify(group_id, |g| g.balance += group_cut)?;
        }
        Ok(amount)
    }

    /// Mints the author side of a settled pool's expertise: the whole group
    /// membership for announcement/final-result content, the listed authors
    /// otherwise, each weighted by group-token holdings.
    fn reward_content_authors(
        &mut self,
        research_id: ResearchId,
        kind: ResearchContentKind,
        authors: &BTreeSet<AccountName>,
        discipline_id: DisciplineId,
        pot: Tokens,
    ) -> Result<(), ChainError> {
        if !pot.is_positive() {
            return Ok(());
        }
        let group_id = self.get_research(research_id)?.research_group_id;
        let members: Vec<(AccountName, i64)> = self
            .state
            .research_group_tokens
            .iter()
            .filter(|t| t.research_group_id == group_id && t.amount > 0)
            .map(|t| (t.owner.clone(), t.amount))
            .collect();
        let weighted: Vec<(AccountName, i64)> = if kind.credits_whole_group() {
            members
        } else {
            members
                .into_iter()
                .filter(|(name, _)| authors.contains(name))
                .collect()
        };
        let total: i64 = weighted.iter().map(|(_, w)| w).sum();
        if total <= 0 {
            return Ok(());
        }
        for (author, weight) in weighted {
            let share = Tokens::new(multiply_ratio(pot.amount(), weight, total));
            self.reward_with_expertise(&author, discipline_id, share)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Activity windows
    // ------------------------------------------------------------------

    /// Drives every content's review-window state machine: opens pending
    /// windows whose start has arrived and closes active windows whose end
    /// has passed, settling their pools and moving discipline weight.
    /// Round transitions chain off the scheduled window end, not the block
    /// time that observed it.
    pub(crate) fn process_content_activity_windows(&mut self) -> Result<(), ChainError> {
        let now = self.head_block_time();
        let due: Vec<u64> = self
            .state
            .research_contents
            .iter()
            .filter(|c| match c.activity_state {
                ActivityState::Active => now >= c.activity_window_end,
                ActivityState::Pending => now >= c.activity_window_start,
                ActivityState::Closed => false,
            })
            .map(|c| c.id)
            .collect();

        for content_id in due {
            let Some(content) = self.state.research_contents.get(content_id) else {
                continue;
            };
            match content.activity_state {
                ActivityState::Active => self.close_activity_window(content_id)?,
                ActivityState::Pending => self.open_activity_window(content_id)?,
                ActivityState::Closed => {}
            }
        }
        Ok(())
    }

    fn open_activity_window(&mut self, content_id: ResearchContentId) -> Result<(), ChainError> {
        let deltas: Vec<(DisciplineId, i64)> = self
            .state
            .total_votes
            .iter()
            .filter(|tv| tv.research_content_id == content_id && tv.total_weight != 0)
            .map(|tv| (tv.discipline_id, tv.total_weight))
            .collect();
        for (discipline_id, weight) in deltas {
            self.state
                .disciplines
                .modify(discipline_id, |d| d.total_active_weight += weight)?;
        }
        self.state
            .research_contents
            .modify(content_id, |c| c.activity_state = ActivityState::Active)?;
        trace!(content = content_id, "review window opened");
        Ok(())
    }

    fn close_activity_window(&mut self, content_id: ResearchContentId) -> Result<(), ChainError> {
        // Settle every escrow pool for this content before weights move.
        let pool_disciplines: Vec<DisciplineId> = self
            .state
            .reward_pools
            .iter()
            .filter(|p| p.research_content_id == content_id)
            .map(|p| p.discipline_id)
            .collect();
        for discipline_id in pool_disciplines {
            self.reward_research_content(content_id, discipline_id)?;
        }

        let deltas: Vec<(DisciplineId, i64)> = self
            .state
            .total_votes
            .iter()
            .filter(|tv| tv.research_content_id == content_id && tv.total_weight != 0)
            .map(|tv| (tv.discipline_id, tv.total_weight))
            .collect();
        for (discipline_id, weight) in deltas {
            self.state
                .disciplines
                .modify(discipline_id, |d| d.total_active_weight -= weight)?;
        }

        let content = self.get_research_content(content_id)?;
        let kind = content.kind;
        let closed_round = content.activity_round;
        let closed_end = content.activity_window_end;
        let next_round = closed_round + 1;
        match self.constants().activity_round(kind, next_round) {
            Some((gap, duration)) => {
                let start = closed_end.saturating_add(gap);
                let end = start.saturating_add(duration);
                self.state.research_contents.modify(content_id, |c| {
                    c.activity_round = next_round;
                    c.activity_state = ActivityState::Pending;
                    c.activity_window_start = start;
                    c.activity_window_end = end;
                })?;
            }
            None => {
                self.state.research_contents.modify(content_id, |c| {
                    c.activity_state = ActivityState::Closed;
                    c.activity_window_start = lyceum_types::ChainTime::MAX;
                    c.activity_window_end = lyceum_types::ChainTime::MAX;
                })?;
            }
        }
        trace!(content = content_id, round = closed_round, "review window closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use lyceum_types::ChainTime;

    use crate::state::{Research, Review, ReviewVote};
    use crate::testing::dev_db;

    use super::*;

    #[test]
    fn emission_rate_narrows_one_bp_per_period() {
        assert_eq!(emission_rate_bp(0, 978, 95, 250_000), 978);
        assert_eq!(emission_rate_bp(249_999, 978, 95, 250_000), 978);
        assert_eq!(emission_rate_bp(250_000, 978, 95, 250_000), 977);
        assert_eq!(emission_rate_bp(u32::MAX, 978, 95, 250_000), 95);
    }

    #[test]
    fn lone_review_keeps_its_raw_weight() {
        assert_eq!(review_weight_modifier(1_000, 1_000, 1, 0, 0), 1_000);
        assert_eq!(review_weight_modifier(1_000, 1_000, 1, 500, 500), 1_000);
        assert_eq!(review_weight_modifier(7, 7, 1, 3, 3), 7);
    }

    #[test]
    fn curation_term_needs_positive_votes() {
        // Two equal reviews, no votes anywhere: expertise term only.
        assert_eq!(review_weight_modifier(100, 200, 2, 0, 0), 100);
        // Negative own votes clamp to zero.
        assert_eq!(review_weight_modifier(100, 200, 2, -50, 100), 100);
        // All votes on this review: 100 + 10*100*(1/2) = 600.
        assert_eq!(review_weight_modifier(100, 200, 2, 100, 100), 600);
    }

    proptest! {
        #[test]
        fn prop_modifier_identity_for_single_review(e in 1i64..1_000_000_000) {
            prop_assert_eq!(review_weight_modifier(e, i128::from(e), 1, 0, 0), e);
        }

        #[test]
        fn prop_modifier_stays_bounded(
            e in 1i64..1_000_000,
            extra in 0i64..1_000_000,
            n in 1i128..20,
            v in 0i64..1_000_000,
            extra_v in 0i64..1_000_000,
        ) {
            let sum = i128::from(e) + i128::from(extra);
            let votes_sum = i128::from(v) + i128::from(extra_v);
            let w = review_weight_modifier(e, sum, n, v, votes_sum);
            // Expertise term is at most e*n (own <= sum), curation at most 10*e.
            prop_assert!(w >= 0);
            prop_assert!(i128::from(w) <= i128::from(e) * n + 10 * i128::from(e));
        }
    }

    /// One discipline with one active content and one review carrying all
    /// the weight, built straight into state.
    fn seed_reviewed_content(db: &mut Database) -> (DisciplineId, u64, u64) {
        let discipline_id = 2; // "statistics" in the dev genesis
        let group_id = db
            .state
            .research_groups
            .iter()
            .find(|g| g.name == "alice")
            .map(|g| g.id)
            .unwrap();
        let research_id = db
            .state
            .researches
            .create(|id| Research {
                id,
                research_group_id: group_id,
                title: "t".into(),
                abstract_text: String::new(),
                permlink: "t".into(),
                review_share_percent: 0,
                last_review_share_update: ChainTime::ZERO,
                dropout_compensation_percent: 0,
                is_finished: false,
                owned_tokens: crate::database::GROUP_SHARE_UNITS,
                created: ChainTime::ZERO,
            })
            .id;
        let content_id = db
            .state
            .research_contents
            .create(|id| crate::state::ResearchContent {
                id,
                research_id,
                kind: ResearchContentKind::MilestoneArticle,
                title: "m".into(),
                content: "hash".into(),
                authors: [String::from("bobby")].into_iter().collect(),
                references: Vec::new(),
                created_at: ChainTime::ZERO,
                activity_round: 1,
                activity_state: ActivityState::Active,
                activity_window_start: ChainTime::ZERO,
                activity_window_end: ChainTime::from_secs(300),
            })
            .id;
        let review_id = db
            .state
            .reviews
            .create(|id| Review {
                id,
                research_content_id: content_id,
                author: "bobby".into(),
                is_positive: true,
                content: "r".into(),
                created_at: ChainTime::ZERO,
                expertise_spent: [(discipline_id, 100)].into_iter().collect(),
                disciplines: [discipline_id].into_iter().collect(),
            })
            .id;
        db.recompute_review_weights(content_id, discipline_id).unwrap();
        (discipline_id, content_id, review_id)
    }

    #[test]
    fn recompute_sets_total_votes_and_active_weight() {
        let mut db = dev_db();
        let (discipline_id, content_id, _) = seed_reviewed_content(&mut db);
        let tv = db
            .state
            .total_votes
            .iter()
            .find(|tv| tv.research_content_id == content_id)
            .unwrap();
        assert_eq!(tv.total_weight, 100);
        assert_eq!(
            db.get_discipline(discipline_id).unwrap().total_active_weight,
            100
        );
    }

    #[test]
    fn distribution_pays_reviews_and_escrows_the_rest() {
        let mut db = dev_db();
        let (discipline_id, content_id, _) = seed_reviewed_content(&mut db);
        let author_before = db.get_account("bobby").unwrap().balance;
        let expertise_before = db
            .find_expert_token("bobby", discipline_id)
            .unwrap()
            .amount;

        let used = db
            .distribute_reward(Tokens::new(1_000), Tokens::new(1_000))
            .unwrap();

        // 5% review cut = 50; curator cut 5% of that = 2, no voters, so the
        // author gets 48 and the 95% remainder escrows into the pool.
        let pool = db
            .state
            .reward_pools
            .iter()
            .find(|p| p.research_content_id == content_id)
            .unwrap();
        assert_eq!(pool.reward_share, Tokens::new(950));
        assert_eq!(pool.expertise_share, Tokens::new(950));
        assert_eq!(
            db.get_account("bobby").unwrap().balance,
            author_before + Tokens::new(48)
        );
        assert_eq!(
            db.find_expert_token("bobby", discipline_id).unwrap().amount,
            expertise_before + Tokens::new(50)
        );
        assert_eq!(used, Tokens::new(998));
    }

    #[test]
    fn settlement_pays_token_holders_and_the_group() {
        let mut db = dev_db();
        let (discipline_id, content_id, _) = seed_reviewed_content(&mut db);
        let research_id = db.get_research_content(content_id).unwrap().research_id;
        // alice holds 3000 of the 10000 units directly.
        db.state
            .researches
            .modify(research_id, |r| r.owned_tokens = 7_000)
            .unwrap();
        db.state.research_tokens.create(|id| crate::state::ResearchToken {
            id,
            account: "alice".into(),
            research_id,
            amount: 3_000,
        });
        db.accrue_reward_pool(content_id, discipline_id, Tokens::new(1_000), Tokens::ZERO);

        let alice_before = db.get_account("alice").unwrap().balance;
        db.reward_research_content(content_id, discipline_id).unwrap();

        // No references, review share 0%: everything goes to holders.
        assert_eq!(
            db.get_account("alice").unwrap().balance,
            alice_before + Tokens::new(300)
        );
        let group = db
            .state
            .research_groups
            .iter()
            .find(|g| g.name == "alice")
            .unwrap();
        assert_eq!(group.balance, Tokens::new(700));
        assert!(db
            .state
            .reward_pools
            .iter()
            .all(|p| p.research_content_id != content_id));
    }

    #[test]
    fn curators_share_a_review_cut_by_vote_weight() {
        let mut db = dev_db();
        let (discipline_id, _, review_id) = seed_reviewed_content(&mut db);
        db.state.review_votes.create(|id| ReviewVote {
            id,
            review_id,
            discipline_id,
            voter: "alice".into(),
            weight: 75,
            voting_time: ChainTime::ZERO,
        });
        let alice_before = db.get_account("alice").unwrap().balance;
        let paid = db
            .reward_review_voters(review_id, discipline_id, Tokens::new(40))
            .unwrap();
        assert_eq!(paid, Tokens::new(40));
        assert_eq!(
            db.get_account("alice").unwrap().balance,
            alice_before + Tokens::new(40)
        );
    }

    #[test]
    fn window_close_settles_and_schedules_the_next_round() {
        let mut db = dev_db();
        let (discipline_id, content_id, _) = seed_reviewed_content(&mut db);
        db.accrue_reward_pool(content_id, discipline_id, Tokens::new(100), Tokens::ZERO);
        // Move chain time past the round-1 window end.
        db.modify_global(|g| g.time = ChainTime::from_secs(301));

        db.process_content_activity_windows().unwrap();

        let content = db.get_research_content(content_id).unwrap();
        assert_eq!(content.activity_state, ActivityState::Pending);
        assert_eq!(content.activity_round, 2);
        // Round 2 chains off the scheduled end (300s), not the block time.
        let constants = db.constants();
        let expected_start = ChainTime::from_secs(300 + constants.regular_round_two_gap_secs);
        assert_eq!(content.activity_window_start, expected_start);
        assert_eq!(
            db.get_discipline(discipline_id).unwrap().total_active_weight,
            0
        );
        assert!(db.state.reward_pools.iter().next().is_none());

        // Reaching the round-2 start reopens the window and restores weight.
        db.modify_global(|g| g.time = expected_start);
        db.process_content_activity_windows().unwrap();
        assert!(db.get_research_content(content_id).unwrap().is_active());
        assert_eq!(
            db.get_discipline(discipline_id).unwrap().total_active_weight,
            100
        );
    }

    #[test]
    fn milestones_close_for_good_after_round_two() {
        let mut db = dev_db();
        let (_, content_id, _) = seed_reviewed_content(&mut db);
        db.state
            .research_contents
            .modify(content_id, |c| c.activity_round = 2)
            .unwrap();
        db.modify_global(|g| g.time = ChainTime::from_secs(400));
        db.process_content_activity_windows().unwrap();

        let content = db.get_research_content(content_id).unwrap();
        assert_eq!(content.activity_state, ActivityState::Closed);
        assert_eq!(content.activity_window_start, ChainTime::MAX);
        assert_eq!(content.activity_window_end, ChainTime::MAX);
    }

    #[test]
    fn process_funds_pays_the_witness() {
        let mut db = dev_db();
        db.modify_global(|g| {
            g.current_supply = Tokens::new(1_000_000_000_000);
            g.head_block_number = 1;
        });
        let supply_before = db.get_dynamic_global_properties().current_supply;

        db.process_funds().unwrap();

        // to_emit = 1e12 * 978 / (10000 * 10512000) = 9303; 3% of that is
        // the witness budget, paid whole to the only scheduled witness.
        let witness_pay = db.get_account("alice").unwrap().common_tokens;
        assert_eq!(witness_pay, Tokens::new(280));
        let global = db.get_dynamic_global_properties();
        assert_eq!(global.current_supply, supply_before + Tokens::new(280));
        assert_eq!(global.common_tokens_fund, witness_pay);
    }
}
