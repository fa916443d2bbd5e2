//! Expert reviews and curation votes on them.
//!
//! Both spend from the expert token's regenerating voting power: a review
//! commits the chosen fraction of current power in every discipline shared
//! between author and research, a vote commits a spread-damped fraction in
//! one discipline. The raw expertise stake never shrinks; what gets used is
//! recorded on the review and feeds the per-discipline weight totals.

use std::collections::{BTreeMap, BTreeSet};

use lyceum_types::{multiply_ratio, ChainTime, DisciplineId, Operation, Tokens, FULL_PERCENT};

use crate::database::Database;
use crate::error::{ensure, ChainError};
use crate::state::{Review, ReviewVote};

/// Voting power in basis points after regeneration, capped at full power.
fn regenerated_power(power: u16, last_vote: ChainTime, now: ChainTime, regen_secs: u32) -> i64 {
    let elapsed = i64::from(now.secs_since(last_vote));
    let regenerated = i64::from(FULL_PERCENT) * elapsed / i64::from(regen_secs.max(1));
    (i64::from(power) + regenerated).min(i64::from(FULL_PERCENT))
}

pub(super) fn make_review(db: &mut Database, op: &Operation) -> Result<(), ChainError> {
    let Operation::MakeReview(op) = op else {
        unreachable!("dispatched by kind");
    };
    db.get_account(&op.author)?;
    let content = db.get_research_content(op.research_content_id)?;
    ensure!(
        content.is_active(),
        "research content {} is not in an open review window",
        op.research_content_id
    );
    ensure!(
        !content.authors.contains(&op.author),
        "`{}` cannot review their own content",
        op.author
    );
    let research_id = content.research_id;
    ensure!(
        !db.state
            .reviews
            .iter()
            .any(|r| r.research_content_id == op.research_content_id && r.author == op.author),
        "`{}` already reviewed research content {}",
        op.author,
        op.research_content_id
    );

    // The review spans every research discipline the author holds positive
    // expertise in.
    let disciplines: BTreeSet<DisciplineId> = db
        .state
        .research_discipline_relations
        .iter()
        .filter(|rel| rel.research_id == research_id)
        .map(|rel| rel.discipline_id)
        .filter(|&d| {
            db.find_expert_token(&op.author, d)
                .is_some_and(|t| t.amount.is_positive())
        })
        .collect();
    ensure!(
        !disciplines.is_empty(),
        "`{}` holds no expertise in the disciplines of research content {}",
        op.author,
        op.research_content_id
    );

    let now = db.head_block_time();
    let regen_secs = db.constants().vote_regeneration_secs;
    let mut expertise_spent: BTreeMap<DisciplineId, i64> = BTreeMap::new();
    for &discipline_id in &disciplines {
        let token = db.get_expert_token(&op.author, discipline_id)?;
        let token_id = token.id;
        let stake = token.amount.amount();
        let current = regenerated_power(token.voting_power, token.last_vote_time, now, regen_secs);
        ensure!(
            current > 0,
            "`{}` has no voting power left in discipline {discipline_id}",
            op.author
        );
        let used = current * i64::from(op.weight) / i64::from(FULL_PERCENT);
        ensure!(
            used > 0,
            "review weight of `{}` rounds to zero in discipline {discipline_id}",
            op.author
        );
        let tokens_used = stake * used / i64::from(FULL_PERCENT);
        ensure!(
            tokens_used > 0,
            "expertise stake of `{}` rounds to zero in discipline {discipline_id}",
            op.author
        );
        db.state.expert_tokens.modify(token_id, |t| {
            t.voting_power = (current - used) as u16;
            t.last_vote_time = now;
        })?;
        expertise_spent.insert(discipline_id, tokens_used);
    }

    let consumed: i64 = expertise_spent.values().sum();
    db.modify_global(|g| g.expertise_consumed_this_block += Tokens::new(consumed));
    db.state.reviews.create(|id| Review {
        id,
        research_content_id: op.research_content_id,
        author: op.author.clone(),
        is_positive: op.is_positive,
        content: op.content.clone(),
        created_at: now,
        expertise_spent,
        disciplines: disciplines.clone(),
    });
    for discipline_id in disciplines {
        db.recompute_review_weights(op.research_content_id, discipline_id)?;
    }
    Ok(())
}

pub(super) fn vote_for_review(db: &mut Database, op: &Operation) -> Result<(), ChainError> {
    let Operation::VoteForReview(op) = op else {
        unreachable!("dispatched by kind");
    };
    db.get_account(&op.voter)?;
    let review = db.get_review(op.review_id)?;
    ensure!(
        review.author != op.voter,
        "`{}` cannot vote on their own review",
        op.voter
    );
    ensure!(
        review.disciplines.contains(&op.discipline_id),
        "review {} carries no weight in discipline {}",
        op.review_id,
        op.discipline_id
    );
    let content_id = review.research_content_id;
    let review_created = review.created_at;
    ensure!(
        !db.state.review_votes.iter().any(|v| {
            v.review_id == op.review_id
                && v.discipline_id == op.discipline_id
                && v.voter == op.voter
        }),
        "`{}` already voted on review {} in discipline {}",
        op.voter,
        op.review_id,
        op.discipline_id
    );

    let token = db.get_expert_token(&op.voter, op.discipline_id)?;
    let token_id = token.id;
    let stake = token.amount.amount();
    let now = db.head_block_time();
    let current = regenerated_power(
        token.voting_power,
        token.last_vote_time,
        now,
        db.constants().vote_regeneration_secs,
    );
    ensure!(
        current > 0,
        "`{}` has no voting power left in discipline {}",
        op.voter,
        op.discipline_id
    );
    let spread = db.constants().review_vote_spread_denominator.max(1);
    let used = current * i64::from(op.weight.unsigned_abs()) / i64::from(FULL_PERCENT) / spread;
    ensure!(used > 0, "vote weight of `{}` rounds to zero", op.voter);
    let tokens_used = stake * used / i64::from(FULL_PERCENT);
    ensure!(
        tokens_used > 0,
        "expertise stake of `{}` rounds to zero",
        op.voter
    );
    db.state.expert_tokens.modify(token_id, |t| {
        t.voting_power = (current - used) as u16;
        t.last_vote_time = now;
    })?;
    db.modify_global(|g| g.expertise_consumed_this_block += Tokens::new(tokens_used));

    // Early votes forfeit weight linearly across the reverse-auction window.
    let window = i64::from(db.constants().reverse_auction_window_secs).max(1);
    let elapsed = i64::from(now.secs_since(review_created)).min(window);
    let discounted = multiply_ratio(tokens_used, elapsed, window);
    let weight = if op.weight < 0 { -discounted } else { discounted };
    db.state.review_votes.create(|id| ReviewVote {
        id,
        review_id: op.review_id,
        discipline_id: op.discipline_id,
        voter: op.voter.clone(),
        weight,
        voting_time: now,
    });
    db.recompute_review_weights(content_id, op.discipline_id)?;
    Ok(())
}
