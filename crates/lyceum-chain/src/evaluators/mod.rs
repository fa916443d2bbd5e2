//! Operation evaluators: the domain rules behind every chain operation.
//!
//! Each [`OperationKind`] maps to exactly one evaluator function. Evaluators
//! run inside the per-operation undo session opened by transaction
//! application, so a rejected operation leaves no partial writes behind.
//! Structural validation and signature checking have already happened by the
//! time an evaluator runs; what lives here are the rules that need chain
//! state.

mod account;
mod funding;
mod group;
mod recovery;
mod review;
mod witness;

use std::collections::BTreeMap;

use lyceum_types::{Operation, OperationKind};

use crate::database::Database;
use crate::error::ChainError;

/// An operation evaluator. Stateless; all context comes from the database.
pub type Evaluator = fn(&mut Database, &Operation) -> Result<(), ChainError>;

/// Dispatch table from operation kind to evaluator.
pub struct EvaluatorRegistry {
    handlers: BTreeMap<OperationKind, Evaluator>,
}

impl EvaluatorRegistry {
    /// The production registry, covering every operation kind.
    pub fn standard() -> Self {
        let mut registry = EvaluatorRegistry {
            handlers: BTreeMap::new(),
        };
        registry.register(OperationKind::CreateAccount, account::create_account);
        registry.register(OperationKind::UpdateAccount, account::update_account);
        registry.register(OperationKind::Transfer, account::transfer);
        registry.register(
            OperationKind::TransferToCommonTokens,
            account::transfer_to_common_tokens,
        );
        registry.register(
            OperationKind::WithdrawCommonTokens,
            account::withdraw_common_tokens,
        );
        registry.register(OperationKind::WitnessUpdate, witness::witness_update);
        registry.register(
            OperationKind::AccountWitnessVote,
            witness::account_witness_vote,
        );
        registry.register(
            OperationKind::AccountWitnessProxy,
            witness::account_witness_proxy,
        );
        registry.register(
            OperationKind::CreateResearchGroup,
            group::create_research_group,
        );
        registry.register(OperationKind::CreateProposal, group::create_proposal);
        registry.register(OperationKind::VoteProposal, group::vote_proposal);
        registry.register(
            OperationKind::ApproveResearchGroupInvite,
            group::approve_invite,
        );
        registry.register(
            OperationKind::RejectResearchGroupInvite,
            group::reject_invite,
        );
        registry.register(OperationKind::MakeReview, review::make_review);
        registry.register(OperationKind::VoteForReview, review::vote_for_review);
        registry.register(
            OperationKind::ContributeToTokenSale,
            funding::contribute_to_token_sale,
        );
        registry.register(
            OperationKind::TransferResearchTokens,
            funding::transfer_research_tokens,
        );
        registry.register(OperationKind::CreateGrant, funding::create_grant);
        registry.register(
            OperationKind::RequestAccountRecovery,
            recovery::request_account_recovery,
        );
        registry.register(OperationKind::RecoverAccount, recovery::recover_account);
        registry.register(
            OperationKind::ChangeRecoveryAccount,
            recovery::change_recovery_account,
        );
        for kind in OperationKind::ALL {
            assert!(
                registry.handlers.contains_key(kind),
                "no evaluator registered for {kind:?}"
            );
        }
        registry
    }

    fn register(&mut self, kind: OperationKind, evaluator: Evaluator) {
        let replaced = self.handlers.insert(kind, evaluator);
        debug_assert!(replaced.is_none(), "evaluator for {kind:?} registered twice");
    }

    pub(crate) fn get_evaluator(&self, kind: OperationKind) -> Evaluator {
        *self
            .handlers
            .get(&kind)
            .expect("every operation kind has an evaluator")
    }
}

#[cfg(test)]
mod tests {
    use lyceum_types::operations::Transfer;
    use lyceum_types::Tokens;

    use crate::testing::dev_db;

    use super::*;

    #[test]
    fn registry_covers_every_operation_kind() {
        let registry = EvaluatorRegistry::standard();
        for &kind in OperationKind::ALL {
            registry.get_evaluator(kind);
        }
    }

    #[test]
    fn dispatch_reaches_the_matching_evaluator() {
        let mut db = dev_db();
        let before = db.get_account("bobby").unwrap().balance;
        let op = Operation::Transfer(Transfer {
            from: "alice".into(),
            to: "bobby".into(),
            amount: Tokens::new(25),
            memo: String::new(),
        });
        let evaluate = db.registry().get_evaluator(op.kind());
        evaluate(&mut db, &op).unwrap();
        assert_eq!(
            db.get_account("bobby").unwrap().balance,
            before + Tokens::new(25)
        );
    }
}
