//! Witness registration, approval votes, and vote proxying.

use lyceum_types::Operation;

use crate::database::Database;
use crate::error::{ensure, ChainError};
use crate::state::{Witness, WitnessVote};

pub(super) fn witness_update(db: &mut Database, op: &Operation) -> Result<(), ChainError> {
    let Operation::WitnessUpdate(op) = op else {
        unreachable!("dispatched by kind");
    };
    db.get_account(&op.owner)?;
    let now = db.head_block_time();
    match db.find_witness(&op.owner).map(|w| w.id) {
        Some(id) => {
            db.state.witnesses.modify(id, |w| {
                w.url = op.url.clone();
                w.signing_key = op.signing_key;
                w.props = op.props.clone();
            })?;
        }
        None => {
            db.state.witnesses.create(|id| Witness {
                id,
                owner: op.owner.clone(),
                url: op.url.clone(),
                signing_key: op.signing_key,
                props: op.props.clone(),
                created: now,
                ..Witness::default()
            });
        }
    }
    Ok(())
}

pub(super) fn account_witness_vote(db: &mut Database, op: &Operation) -> Result<(), ChainError> {
    let Operation::AccountWitnessVote(op) = op else {
        unreachable!("dispatched by kind");
    };
    let voter = db.get_account(&op.account)?;
    ensure!(
        voter.proxy.is_empty(),
        "`{}` votes through a proxy; clear it before voting directly",
        op.account
    );
    let voted_for = voter.witnesses_voted_for;
    let weight = db.witness_vote_weight(voter);
    db.get_witness(&op.witness)?;
    let existing = db
        .state
        .witness_votes
        .iter()
        .find(|v| v.account == op.account && v.witness == op.witness)
        .map(|v| (v.id, v.weight));

    match (op.approve, existing) {
        (true, None) => {
            let limit = db.constants().max_witness_votes_per_account;
            ensure!(
                voted_for < limit,
                "`{}` already votes for {voted_for} witnesses, the limit is {limit}",
                op.account
            );
            db.state.witness_votes.create(|id| WitnessVote {
                id,
                witness: op.witness.clone(),
                account: op.account.clone(),
                weight,
            });
            db.adjust_witness_votes(&op.witness, weight)?;
            db.modify_account(&op.account, |a| a.witnesses_voted_for += 1)?;
        }
        (false, Some((vote_id, recorded_weight))) => {
            db.state.witness_votes.remove(vote_id)?;
            db.adjust_witness_votes(&op.witness, -recorded_weight)?;
            db.modify_account(&op.account, |a| a.witnesses_voted_for -= 1)?;
        }
        (true, Some(_)) => {
            return Err(ChainError::rejected(format!(
                "`{}` already voted for witness `{}`",
                op.account, op.witness
            )));
        }
        (false, None) => {
            return Err(ChainError::rejected(format!(
                "`{}` has no vote for witness `{}` to withdraw",
                op.account, op.witness
            )));
        }
    }
    Ok(())
}

pub(super) fn account_witness_proxy(db: &mut Database, op: &Operation) -> Result<(), ChainError> {
    let Operation::AccountWitnessProxy(op) = op else {
        unreachable!("dispatched by kind");
    };
    let current = db.get_account(&op.account)?.proxy.clone();
    ensure!(
        current != op.proxy,
        "witness vote proxy of `{}` would not change",
        op.account
    );
    if !op.proxy.is_empty() {
        let target = db.get_account(&op.proxy)?;
        // Proxying is single-level: the target must vote directly.
        ensure!(
            target.proxy.is_empty(),
            "`{}` itself votes through a proxy",
            op.proxy
        );
    }
    db.modify_account(&op.account, |a| a.proxy = op.proxy.clone())?;
    Ok(())
}
