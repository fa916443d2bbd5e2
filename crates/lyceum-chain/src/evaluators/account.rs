//! Account lifecycle: creation, authority updates, currency transfers, and
//! the common-token withdrawal schedule.

use lyceum_types::{Authority, ChainTime, Operation, Tokens, FULL_PERCENT};

use crate::database::{Database, GROUP_SHARE_UNITS};
use crate::error::{ensure, ChainError};
use crate::state::{Account, ResearchGroup, ResearchGroupToken};

/// Every account an authority delegates to must exist on chain.
fn ensure_authority_accounts_exist(
    db: &Database,
    authority: &Authority,
) -> Result<(), ChainError> {
    for name in authority.account_auths.keys() {
        db.get_account(name)?;
    }
    Ok(())
}

pub(super) fn create_account(db: &mut Database, op: &Operation) -> Result<(), ChainError> {
    let Operation::CreateAccount(op) = op else {
        unreachable!("dispatched by kind");
    };
    db.get_account(&op.creator)?;
    if db.find_account(&op.new_account_name).is_some() {
        return Err(ChainError::AccountExists(op.new_account_name.clone()));
    }
    let minimum = db.witness_schedule().median_props.account_creation_fee;
    ensure!(
        op.fee >= minimum,
        "account creation fee {} is below the required {minimum}",
        op.fee
    );
    for authority in [&op.owner, &op.active, &op.posting] {
        ensure_authority_accounts_exist(db, authority)?;
    }

    let now = db.head_block_time();
    db.adjust_balance(&op.creator, -op.fee)?;
    db.state.accounts.create(|id| Account {
        id,
        name: op.new_account_name.clone(),
        memo_key: op.memo_key,
        owner: op.owner.clone(),
        active: op.active.clone(),
        posting: op.posting.clone(),
        json_metadata: op.json_metadata.clone(),
        recovery_account: op.creator.clone(),
        created: now,
        last_owner_update: now,
        ..Account::default()
    });
    // The fee becomes the new account's opening common-token stake.
    db.increase_common_tokens(&op.new_account_name, op.fee)?;

    // Personal group, same shape the genesis accounts get.
    let group_id = db
        .state
        .research_groups
        .create(|id| ResearchGroup {
            id,
            name: op.new_account_name.clone(),
            permlink: op.new_account_name.clone(),
            description: String::new(),
            quorum_percent: FULL_PERCENT,
            balance: Tokens::ZERO,
            total_tokens_amount: GROUP_SHARE_UNITS,
            is_personal: true,
        })
        .id;
    db.state
        .research_group_tokens
        .create(|id| ResearchGroupToken {
            id,
            research_group_id: group_id,
            owner: op.new_account_name.clone(),
            amount: GROUP_SHARE_UNITS,
        });
    Ok(())
}

pub(super) fn update_account(db: &mut Database, op: &Operation) -> Result<(), ChainError> {
    let Operation::UpdateAccount(op) = op else {
        unreachable!("dispatched by kind");
    };
    let last_owner_update = db.get_account(&op.account)?.last_owner_update;
    let now = db.head_block_time();
    if op.owner.is_some() {
        let limit = db.constants().owner_update_limit_secs;
        ensure!(
            now.secs_since(last_owner_update) > limit,
            "owner authority can only change once every {limit} seconds"
        );
    }
    for authority in [&op.owner, &op.active, &op.posting].into_iter().flatten() {
        ensure_authority_accounts_exist(db, authority)?;
    }
    db.modify_account(&op.account, |a| {
        if let Some(owner) = &op.owner {
            a.owner = owner.clone();
            a.last_owner_update = now;
        }
        if let Some(active) = &op.active {
            a.active = active.clone();
        }
        if let Some(posting) = &op.posting {
            a.posting = posting.clone();
        }
        if let Some(memo_key) = op.memo_key {
            a.memo_key = memo_key;
        }
        if let Some(metadata) = &op.json_metadata {
            a.json_metadata = metadata.clone();
        }
    })?;
    Ok(())
}

pub(super) fn transfer(db: &mut Database, op: &Operation) -> Result<(), ChainError> {
    let Operation::Transfer(op) = op else {
        unreachable!("dispatched by kind");
    };
    db.get_account(&op.to)?;
    db.adjust_balance(&op.from, -op.amount)?;
    db.adjust_balance(&op.to, op.amount)?;
    Ok(())
}

pub(super) fn transfer_to_common_tokens(
    db: &mut Database,
    op: &Operation,
) -> Result<(), ChainError> {
    let Operation::TransferToCommonTokens(op) = op else {
        unreachable!("dispatched by kind");
    };
    db.get_account(&op.to)?;
    db.adjust_balance(&op.from, -op.amount)?;
    db.increase_common_tokens(&op.to, op.amount)?;
    Ok(())
}

pub(super) fn withdraw_common_tokens(db: &mut Database, op: &Operation) -> Result<(), ChainError> {
    let Operation::WithdrawCommonTokens(op) = op else {
        unreachable!("dispatched by kind");
    };
    let account = db.get_account(&op.account)?;
    if account.common_tokens < op.total_amount {
        return Err(ChainError::InsufficientBalance {
            account: op.account.clone(),
            available: account.common_tokens.amount(),
            required: op.total_amount.amount(),
        });
    }
    let has_schedule = account.has_withdraw_schedule();

    if op.total_amount.is_zero() {
        ensure!(has_schedule, "no common-token withdrawal to cancel");
        db.modify_account(&op.account, |a| {
            a.common_tokens_withdraw_rate = Tokens::ZERO;
            a.next_common_tokens_withdrawal = ChainTime::MAX;
            a.withdrawn = Tokens::ZERO;
            a.to_withdraw = Tokens::ZERO;
        })?;
        return Ok(());
    }

    let intervals = i64::from(db.constants().common_tokens_withdraw_intervals);
    let rate = Tokens::new((op.total_amount.amount() / intervals).max(1));
    let next = db.head_block_time() + db.constants().common_tokens_withdraw_interval_secs;
    let total = op.total_amount;
    db.modify_account(&op.account, |a| {
        a.common_tokens_withdraw_rate = rate;
        a.next_common_tokens_withdrawal = next;
        a.withdrawn = Tokens::ZERO;
        a.to_withdraw = total;
    })?;
    Ok(())
}
