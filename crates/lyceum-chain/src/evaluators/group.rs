//! Research groups and their proposal-driven governance.
//!
//! Groups act only through proposals. A proposal carries a
//! [`ProposalAction`]; members vote with their group-token weight and the
//! action executes inside the vote that pushes it over the group's quorum.

use std::collections::BTreeSet;

use lyceum_types::{
    multiply_ratio, DisciplineId, Operation, ProposalAction, ResearchGroupId, Tokens, FULL_PERCENT,
};

use crate::database::{Database, GROUP_SHARE_UNITS};
use crate::error::{ensure, ChainError};
use crate::state::{
    ActivityState, Invite, Proposal, ProposalVote, Research, ResearchContent,
    ResearchDisciplineRelation, ResearchGroup, ResearchGroupToken, TokenSale, TokenSaleStatus,
};

fn member_weight(
    db: &Database,
    group_id: ResearchGroupId,
    account: &str,
) -> Result<i64, ChainError> {
    match db.find_research_group_token(group_id, account) {
        Some(token) if token.amount > 0 => Ok(token.amount),
        _ => Err(ChainError::rejected(format!(
            "`{account}` is not a member of research group {group_id}"
        ))),
    }
}

pub(super) fn create_research_group(db: &mut Database, op: &Operation) -> Result<(), ChainError> {
    let Operation::CreateResearchGroup(op) = op else {
        unreachable!("dispatched by kind");
    };
    db.get_account(&op.creator)?;
    ensure!(
        !db.state.research_groups.iter().any(|g| g.permlink == op.permlink),
        "research group permlink `{}` is already taken",
        op.permlink
    );
    let group_id = db
        .state
        .research_groups
        .create(|id| ResearchGroup {
            id,
            name: op.name.clone(),
            permlink: op.permlink.clone(),
            description: op.description.clone(),
            quorum_percent: op.quorum_percent,
            balance: Tokens::ZERO,
            total_tokens_amount: GROUP_SHARE_UNITS,
            is_personal: false,
        })
        .id;
    db.state.research_group_tokens.create(|id| ResearchGroupToken {
        id,
        research_group_id: group_id,
        owner: op.creator.clone(),
        amount: GROUP_SHARE_UNITS,
    });
    Ok(())
}

pub(super) fn create_proposal(db: &mut Database, op: &Operation) -> Result<(), ChainError> {
    let Operation::CreateProposal(op) = op else {
        unreachable!("dispatched by kind");
    };
    db.get_account(&op.creator)?;
    let quorum = db.get_research_group(op.research_group_id)?.quorum_percent;
    member_weight(db, op.research_group_id, &op.creator)?;

    let now = db.head_block_time();
    let lifetime = op.expiration_time.secs_since(now);
    let min = db.constants().min_proposal_lifetime_secs;
    let max = db.constants().max_proposal_lifetime_secs;
    ensure!(
        lifetime >= min && lifetime <= max,
        "proposal lifetime of {lifetime} seconds is outside [{min}, {max}]"
    );

    db.state.proposals.create(|id| Proposal {
        id,
        research_group_id: op.research_group_id,
        creator: op.creator.clone(),
        action: op.action.clone(),
        quorum_percent: quorum,
        creation_time: now,
        expiration_time: op.expiration_time,
    });
    Ok(())
}

pub(super) fn vote_proposal(db: &mut Database, op: &Operation) -> Result<(), ChainError> {
    let Operation::VoteProposal(op) = op else {
        unreachable!("dispatched by kind");
    };
    db.get_account(&op.voter)?;
    let proposal = db
        .state
        .proposals
        .get(op.proposal_id)
        .ok_or_else(|| ChainError::rejected(format!("proposal {} does not exist", op.proposal_id)))?;
    let group_id = proposal.research_group_id;
    let quorum = proposal.quorum_percent;
    let expiration = proposal.expiration_time;
    let action = proposal.action.clone();

    let now = db.head_block_time();
    ensure!(now < expiration, "proposal {} has expired", op.proposal_id);
    ensure!(
        !db.state
            .proposal_votes
            .iter()
            .any(|v| v.proposal_id == op.proposal_id && v.voter == op.voter),
        "`{}` already voted on proposal {}",
        op.voter,
        op.proposal_id
    );
    let weight = member_weight(db, group_id, &op.voter)?;
    db.state.proposal_votes.create(|id| ProposalVote {
        id,
        proposal_id: op.proposal_id,
        voter: op.voter.clone(),
        weight,
        voting_time: now,
    });

    let total = db.get_research_group(group_id)?.total_tokens_amount;
    let voted: i64 = db
        .state
        .proposal_votes
        .iter()
        .filter(|v| v.proposal_id == op.proposal_id)
        .map(|v| v.weight)
        .sum();
    if i128::from(voted) * i128::from(FULL_PERCENT) >= i128::from(quorum) * i128::from(total) {
        execute_action(db, group_id, &action)?;
        let vote_ids: Vec<u64> = db
            .state
            .proposal_votes
            .iter()
            .filter(|v| v.proposal_id == op.proposal_id)
            .map(|v| v.id)
            .collect();
        for id in vote_ids {
            db.state.proposal_votes.remove(id)?;
        }
        db.state.proposals.remove(op.proposal_id)?;
    }
    Ok(())
}

pub(super) fn approve_invite(db: &mut Database, op: &Operation) -> Result<(), ChainError> {
    let Operation::ApproveResearchGroupInvite(op) = op else {
        unreachable!("dispatched by kind");
    };
    let invite = db
        .state
        .invites
        .get(op.invite_id)
        .ok_or_else(|| ChainError::rejected(format!("invite {} does not exist", op.invite_id)))?;
    ensure!(
        invite.account == op.account,
        "invite {} is addressed to `{}`",
        op.invite_id,
        invite.account
    );
    let group_id = invite.research_group_id;
    let amount = invite.token_amount;
    let expiration = invite.expiration;
    ensure!(
        db.head_block_time() < expiration,
        "invite {} has expired",
        op.invite_id
    );

    match db.find_research_group_token(group_id, &op.account).map(|t| t.id) {
        Some(token_id) => {
            db.state
                .research_group_tokens
                .modify(token_id, |t| t.amount += amount)?;
        }
        None => {
            db.state.research_group_tokens.create(|id| ResearchGroupToken {
                id,
                research_group_id: group_id,
                owner: op.account.clone(),
                amount,
            });
        }
    }
    // New stake dilutes existing members.
    db.state
        .research_groups
        .modify(group_id, |g| g.total_tokens_amount += amount)?;
    db.state.invites.remove(op.invite_id)?;
    Ok(())
}

pub(super) fn reject_invite(db: &mut Database, op: &Operation) -> Result<(), ChainError> {
    let Operation::RejectResearchGroupInvite(op) = op else {
        unreachable!("dispatched by kind");
    };
    let invite = db
        .state
        .invites
        .get(op.invite_id)
        .ok_or_else(|| ChainError::rejected(format!("invite {} does not exist", op.invite_id)))?;
    ensure!(
        invite.account == op.account,
        "invite {} is addressed to `{}`",
        op.invite_id,
        invite.account
    );
    db.state.invites.remove(op.invite_id)?;
    Ok(())
}

/// Runs a quorum-approved action against its group. Failures propagate and
/// abort the vote that triggered execution.
fn execute_action(
    db: &mut Database,
    group_id: ResearchGroupId,
    action: &ProposalAction,
) -> Result<(), ChainError> {
    let now = db.head_block_time();
    match action {
        ProposalAction::InviteMember { name, token_amount } => {
            let group = db.get_research_group(group_id)?;
            ensure!(!group.is_personal, "personal groups cannot take members");
            db.get_account(name)?;
            ensure!(
                db.find_research_group_token(group_id, name).is_none(),
                "`{name}` is already a member of research group {group_id}"
            );
            ensure!(
                !db.state
                    .invites
                    .iter()
                    .any(|i| i.research_group_id == group_id && i.account == *name),
                "`{name}` already holds an invite to research group {group_id}"
            );
            let expiration = now + db.constants().invite_expiration_secs;
            let amount = *token_amount;
            let invited = name.clone();
            db.state.invites.create(|id| Invite {
                id,
                account: invited,
                research_group_id: group_id,
                token_amount: amount,
                expiration,
            });
        }
        ProposalAction::DropoutMember { name } => {
            let (member_id, member_amount) = db
                .find_research_group_token(group_id, name)
                .map(|t| (t.id, t.amount))
                .ok_or_else(|| {
                    ChainError::rejected(format!(
                        "`{name}` is not a member of research group {group_id}"
                    ))
                })?;
            let researches: Vec<(u64, i64, u16)> = db
                .state
                .researches
                .iter()
                .filter(|r| r.research_group_id == group_id)
                .map(|r| (r.id, r.owned_tokens, r.dropout_compensation_percent))
                .collect();
            for (research_id, owned, compensation_percent) in researches {
                // Compensation comes out of the research's own share units,
                // sized by the member's stake in the group.
                let share = multiply_ratio(
                    member_amount,
                    i64::from(compensation_percent),
                    i64::from(FULL_PERCENT),
                );
                let compensation = multiply_ratio(owned, share, GROUP_SHARE_UNITS);
                if compensation > 0 {
                    db.state
                        .researches
                        .modify(research_id, |r| r.owned_tokens -= compensation)?;
                    db.grant_research_tokens(name, research_id, compensation);
                }
            }
            db.state.research_group_tokens.remove(member_id)?;
            db.state
                .research_groups
                .modify(group_id, |g| g.total_tokens_amount -= member_amount)?;
        }
        ProposalAction::ChangeQuorum { quorum_percent } => {
            let group = db.get_research_group(group_id)?;
            ensure!(!group.is_personal, "personal groups keep a fixed quorum");
            db.state
                .research_groups
                .modify(group_id, |g| g.quorum_percent = *quorum_percent)?;
        }
        ProposalAction::ChangeResearchReviewShare {
            research_id,
            review_share_percent,
        } => {
            let research = db.get_research(*research_id)?;
            ensure!(
                research.research_group_id == group_id,
                "research {research_id} belongs to another group"
            );
            let last = research.last_review_share_update;
            let interval = db.constants().review_share_update_interval_secs;
            ensure!(
                now.secs_since(last) >= interval,
                "review share of research {research_id} can only change every {interval} seconds"
            );
            db.state.researches.modify(*research_id, |r| {
                r.review_share_percent = *review_share_percent;
                r.last_review_share_update = now;
            })?;
        }
        ProposalAction::StartResearch {
            title,
            abstract_text,
            permlink,
            disciplines,
            review_share_percent,
            dropout_compensation_percent,
        } => {
            ensure!(
                !db.state
                    .researches
                    .iter()
                    .any(|r| r.research_group_id == group_id && r.permlink == *permlink),
                "research permlink `{permlink}` is already taken in research group {group_id}"
            );
            let unique: BTreeSet<DisciplineId> = disciplines.iter().copied().collect();
            for &discipline_id in &unique {
                ensure!(discipline_id != 0, "the root discipline cannot tag a research");
                db.get_discipline(discipline_id)?;
            }
            let research_id = db
                .state
                .researches
                .create(|id| Research {
                    id,
                    research_group_id: group_id,
                    title: title.clone(),
                    abstract_text: abstract_text.clone(),
                    permlink: permlink.clone(),
                    review_share_percent: *review_share_percent,
                    last_review_share_update: now,
                    dropout_compensation_percent: *dropout_compensation_percent,
                    is_finished: false,
                    owned_tokens: GROUP_SHARE_UNITS,
                    created: now,
                })
                .id;
            for discipline_id in unique {
                db.state
                    .research_discipline_relations
                    .create(|id| ResearchDisciplineRelation {
                        id,
                        research_id,
                        discipline_id,
                    });
            }
        }
        ProposalAction::SendFunds { recipient, amount } => {
            db.get_account(recipient)?;
            let group = db.get_research_group(group_id)?;
            if group.balance < *amount {
                return Err(ChainError::InsufficientBalance {
                    account: group.name.clone(),
                    available: group.balance.amount(),
                    required: amount.amount(),
                });
            }
            db.state
                .research_groups
                .modify(group_id, |g| g.balance -= *amount)?;
            db.adjust_balance(recipient, *amount)?;
        }
        ProposalAction::RebalanceGroupTokens { deltas } => {
            // Deltas net to zero, so the group total is untouched.
            for (name, delta) in deltas {
                let (token_id, amount) = db
                    .find_research_group_token(group_id, name)
                    .map(|t| (t.id, t.amount))
                    .ok_or_else(|| {
                        ChainError::rejected(format!(
                            "`{name}` is not a member of research group {group_id}"
                        ))
                    })?;
                let rebalanced = amount + *delta;
                ensure!(
                    rebalanced >= 0,
                    "rebalance would leave `{name}` with negative group tokens"
                );
                if rebalanced == 0 {
                    db.state.research_group_tokens.remove(token_id)?;
                } else {
                    db.state
                        .research_group_tokens
                        .modify(token_id, |t| t.amount = rebalanced)?;
                }
            }
        }
        ProposalAction::CreateResearchMaterial {
            research_id,
            kind,
            title,
            content,
            authors,
            references,
        } => {
            let research = db.get_research(*research_id)?;
            ensure!(
                research.research_group_id == group_id,
                "research {research_id} belongs to another group"
            );
            ensure!(
                !research.is_finished,
                "research {research_id} already published its final result"
            );
            for author in authors {
                db.get_account(author)?;
            }
            for reference in references {
                db.get_research_content(*reference)?;
            }
            let (_, window_secs) = db
                .constants()
                .activity_round(*kind, 1)
                .expect("every content kind has a first review round");
            db.state.research_contents.create(|id| ResearchContent {
                id,
                research_id: *research_id,
                kind: *kind,
                title: title.clone(),
                content: content.clone(),
                authors: authors.iter().cloned().collect(),
                references: references.clone(),
                created_at: now,
                activity_round: 1,
                activity_state: ActivityState::Active,
                activity_window_start: now,
                activity_window_end: now + window_secs,
            });
            if kind.is_final_result() {
                db.state
                    .researches
                    .modify(*research_id, |r| r.is_finished = true)?;
            }
        }
        ProposalAction::StartTokenSale {
            research_id,
            start_time,
            end_time,
            share_units_for_sale,
            soft_cap,
            hard_cap,
        } => {
            let research = db.get_research(*research_id)?;
            ensure!(
                research.research_group_id == group_id,
                "research {research_id} belongs to another group"
            );
            ensure!(*start_time >= now, "token sale cannot start in the past");
            ensure!(
                *share_units_for_sale <= research.owned_tokens,
                "research {research_id} holds only {} of the {} share units offered",
                research.owned_tokens,
                share_units_for_sale
            );
            ensure!(
                !db.state.token_sales.iter().any(|s| {
                    s.research_id == *research_id
                        && matches!(s.status, TokenSaleStatus::Inactive | TokenSaleStatus::Active)
                }),
                "research {research_id} already has an open token sale"
            );
            db.state
                .researches
                .modify(*research_id, |r| r.owned_tokens -= *share_units_for_sale)?;
            db.state.token_sales.create(|id| TokenSale {
                id,
                research_id: *research_id,
                start_time: *start_time,
                end_time: *end_time,
                balance_tokens: *share_units_for_sale,
                soft_cap: *soft_cap,
                hard_cap: *hard_cap,
                total_amount: Tokens::ZERO,
                status: TokenSaleStatus::Inactive,
            });
        }
    }
    Ok(())
}
