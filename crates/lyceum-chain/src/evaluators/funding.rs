//! Token sale contributions, research-token transfers, and grants.

use lyceum_types::{Operation, Tokens};

use crate::database::Database;
use crate::error::{ensure, ChainError};
use crate::state::Grant;

pub(super) fn contribute_to_token_sale(db: &mut Database, op: &Operation) -> Result<(), ChainError> {
    let Operation::ContributeToTokenSale(op) = op else {
        unreachable!("dispatched by kind");
    };
    db.get_account(&op.contributor)?;
    db.contribute_to_token_sale(op.token_sale_id, &op.contributor, op.amount)?;
    Ok(())
}

pub(super) fn transfer_research_tokens(db: &mut Database, op: &Operation) -> Result<(), ChainError> {
    let Operation::TransferResearchTokens(op) = op else {
        unreachable!("dispatched by kind");
    };
    db.get_research(op.research_id)?;
    db.get_account(&op.receiver)?;
    let (holding_id, held) = db
        .find_research_token(&op.sender, op.research_id)
        .map(|t| (t.id, t.amount))
        .ok_or_else(|| {
            ChainError::rejected(format!(
                "`{}` holds no tokens of research {}",
                op.sender, op.research_id
            ))
        })?;
    ensure!(
        held >= op.amount,
        "`{}` holds {held} of the {} research token units to transfer",
        op.sender,
        op.amount
    );
    if held == op.amount {
        db.state.research_tokens.remove(holding_id)?;
    } else {
        db.state
            .research_tokens
            .modify(holding_id, |t| t.amount = held - op.amount)?;
    }
    db.grant_research_tokens(&op.receiver, op.research_id, op.amount);
    Ok(())
}

pub(super) fn create_grant(db: &mut Database, op: &Operation) -> Result<(), ChainError> {
    let Operation::CreateGrant(op) = op else {
        unreachable!("dispatched by kind");
    };
    db.get_account(&op.grantor)?;
    ensure!(
        op.target_discipline != 0,
        "grants cannot target the root discipline"
    );
    db.get_discipline(op.target_discipline)?;
    let now = db.head_block_time();
    ensure!(op.start_time >= now, "grant cannot start in the past");

    let open = db
        .state
        .grants
        .iter()
        .filter(|g| g.grantor == op.grantor)
        .count();
    let limit = db.constants().max_grants_per_account;
    ensure!(
        open < limit as usize,
        "`{}` already runs {open} grants, the limit is {limit}",
        op.grantor
    );

    let duration = i64::from(op.end_time.secs_since(op.start_time));
    let blocks = (duration / i64::from(db.constants().block_interval_secs)).max(1);
    let per_block = (op.amount.amount() / blocks).max(db.constants().min_grant_per_block);
    db.adjust_balance(&op.grantor, -op.amount)?;
    db.state.grants.create(|id| Grant {
        id,
        grantor: op.grantor.clone(),
        target_discipline: op.target_discipline,
        balance: op.amount,
        per_block: Tokens::new(per_block),
        start_time: op.start_time,
        end_time: op.end_time,
        is_extendable: op.is_extendable,
        created: now,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use lyceum_types::operations::{ContributeToTokenSale, CreateGrant, TransferResearchTokens};
    use lyceum_types::ChainTime;

    use crate::state::{ResearchToken, TokenSale, TokenSaleStatus};
    use crate::testing::dev_db;

    use super::*;

    fn seed_active_sale(db: &mut Database) -> u64 {
        let research_id = db
            .state
            .researches
            .create(|id| crate::state::Research {
                id,
                research_group_id: 0,
                title: "adaptive filters".into(),
                abstract_text: String::new(),
                permlink: "adaptive-filters".into(),
                review_share_percent: 0,
                last_review_share_update: ChainTime::ZERO,
                dropout_compensation_percent: 0,
                is_finished: false,
                owned_tokens: 9_000,
                created: ChainTime::ZERO,
            })
            .id;
        db.state
            .token_sales
            .create(|id| TokenSale {
                id,
                research_id,
                start_time: ChainTime::ZERO,
                end_time: ChainTime::from_secs(1_000),
                balance_tokens: 1_000,
                soft_cap: Tokens::new(50),
                hard_cap: Tokens::new(200),
                total_amount: Tokens::ZERO,
                status: TokenSaleStatus::Active,
            })
            .id
    }

    #[test]
    fn contribution_moves_funds_into_the_sale() {
        let mut db = dev_db();
        let sale_id = seed_active_sale(&mut db);
        let before = db.get_account("alice").unwrap().balance;

        contribute_to_token_sale(
            &mut db,
            &Operation::ContributeToTokenSale(ContributeToTokenSale {
                contributor: "alice".into(),
                token_sale_id: sale_id,
                amount: Tokens::new(60),
            }),
        )
        .unwrap();

        assert_eq!(db.get_account("alice").unwrap().balance, before - Tokens::new(60));
        let sale = db.get_research_token_sale(sale_id).unwrap();
        assert_eq!(sale.total_amount, Tokens::new(60));
        assert_eq!(db.state.sale_contributions.len(), 1);
        db.validate_invariants();
    }

    #[test]
    fn research_token_transfers_split_and_merge_holdings() {
        let mut db = dev_db();
        let research_id = seed_active_sale(&mut db);
        let research_id = db.get_research_token_sale(research_id).unwrap().research_id;
        db.state.research_tokens.create(|id| ResearchToken {
            id,
            account: "alice".into(),
            research_id,
            amount: 700,
        });

        let transfer = |amount| {
            Operation::TransferResearchTokens(TransferResearchTokens {
                sender: "alice".into(),
                receiver: "bobby".into(),
                research_id,
                amount,
            })
        };
        transfer_research_tokens(&mut db, &transfer(300)).unwrap();
        assert_eq!(db.find_research_token("alice", research_id).unwrap().amount, 400);
        assert_eq!(db.find_research_token("bobby", research_id).unwrap().amount, 300);

        transfer_research_tokens(&mut db, &transfer(500)).unwrap_err();

        // Sending the rest removes the empty holding.
        transfer_research_tokens(&mut db, &transfer(400)).unwrap();
        assert!(db.find_research_token("alice", research_id).is_none());
        assert_eq!(db.find_research_token("bobby", research_id).unwrap().amount, 700);
    }

    #[test]
    fn grant_escrows_the_balance_with_a_per_block_rate() {
        let mut db = dev_db();
        let before = db.get_account("alice").unwrap().balance;

        create_grant(
            &mut db,
            &Operation::CreateGrant(CreateGrant {
                grantor: "alice".into(),
                target_discipline: 2,
                amount: Tokens::new(1_000),
                start_time: ChainTime::ZERO,
                end_time: ChainTime::from_secs(30),
                is_extendable: false,
            }),
        )
        .unwrap();

        assert_eq!(db.get_account("alice").unwrap().balance, before - Tokens::new(1_000));
        let grant = db.state.grants.iter().next().unwrap();
        assert_eq!(grant.balance, Tokens::new(1_000));
        // 30 seconds at the 3-second block interval.
        assert_eq!(grant.per_block, Tokens::new(100));
        db.validate_invariants();
    }

    #[test]
    fn grants_skip_the_root_discipline() {
        let mut db = dev_db();
        create_grant(
            &mut db,
            &Operation::CreateGrant(CreateGrant {
                grantor: "alice".into(),
                target_discipline: 0,
                amount: Tokens::new(100),
                start_time: ChainTime::ZERO,
                end_time: ChainTime::from_secs(30),
                is_extendable: false,
            }),
        )
        .unwrap_err();
    }

    #[test]
    fn grants_per_account_are_capped() {
        let mut db = dev_db();
        let limit = db.constants().max_grants_per_account;
        for i in 0..limit {
            create_grant(
                &mut db,
                &Operation::CreateGrant(CreateGrant {
                    grantor: "alice".into(),
                    target_discipline: 1,
                    amount: Tokens::new(10),
                    start_time: ChainTime::from_secs(i),
                    end_time: ChainTime::from_secs(i + 30),
                    is_extendable: false,
                }),
            )
            .unwrap();
        }

        create_grant(
            &mut db,
            &Operation::CreateGrant(CreateGrant {
                grantor: "alice".into(),
                target_discipline: 1,
                amount: Tokens::new(10),
                start_time: ChainTime::ZERO,
                end_time: ChainTime::from_secs(30),
                is_extendable: false,
            }),
        )
        .unwrap_err();
    }
}
