use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::account::{validate_account_name, AccountName};
use crate::asset::{validate_percent, Tokens};
use crate::authority::{Authority, PublicKey};
use crate::error::TypeError;
use crate::ids::{
    DisciplineId, InviteId, ProposalId, ResearchGroupId, ResearchId, ReviewId, TokenSaleId,
};
use crate::proposal::ProposalAction;
use crate::time::ChainTime;

pub const MAX_MEMO_SIZE: usize = 2048;
pub const MAX_TITLE_SIZE: usize = 255;

/// Witness-published chain parameters; medians of the scheduled witnesses'
/// values become the effective limits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainProperties {
    pub account_creation_fee: Tokens,
    pub maximum_block_size: u32,
}

impl Default for ChainProperties {
    fn default() -> Self {
        Self {
            account_creation_fee: Tokens::new(1),
            maximum_block_size: crate::block::MIN_BLOCK_SIZE_LIMIT * 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccount {
    pub fee: Tokens,
    pub creator: AccountName,
    pub new_account_name: AccountName,
    pub owner: Authority,
    pub active: Authority,
    pub posting: Authority,
    pub memo_key: PublicKey,
    pub json_metadata: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAccount {
    pub account: AccountName,
    pub owner: Option<Authority>,
    pub active: Option<Authority>,
    pub posting: Option<Authority>,
    pub memo_key: Option<PublicKey>,
    pub json_metadata: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: AccountName,
    pub to: AccountName,
    pub amount: Tokens,
    pub memo: String,
}

/// Converts liquid balance into the recipient's common (vesting) tokens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferToCommonTokens {
    pub from: AccountName,
    pub to: AccountName,
    pub amount: Tokens,
}

/// Schedules withdrawal of common tokens back to liquid balance over the
/// fixed interval schedule. A zero amount cancels any running withdrawal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawCommonTokens {
    pub account: AccountName,
    pub total_amount: Tokens,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessUpdate {
    pub owner: AccountName,
    pub url: String,
    pub signing_key: PublicKey,
    pub props: ChainProperties,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountWitnessVote {
    pub account: AccountName,
    pub witness: AccountName,
    pub approve: bool,
}

/// Sets or clears (empty proxy) the account's witness-vote delegate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountWitnessProxy {
    pub account: AccountName,
    pub proxy: AccountName,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateResearchGroup {
    pub creator: AccountName,
    pub name: String,
    pub permlink: String,
    pub description: String,
    pub quorum_percent: u16,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProposal {
    pub creator: AccountName,
    pub research_group_id: ResearchGroupId,
    pub action: ProposalAction,
    pub expiration_time: ChainTime,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteProposal {
    pub voter: AccountName,
    pub proposal_id: ProposalId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveResearchGroupInvite {
    pub account: AccountName,
    pub invite_id: InviteId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectResearchGroupInvite {
    pub account: AccountName,
    pub invite_id: InviteId,
}

/// Publishes a review of a research-content item, staking the author's
/// expertise across the disciplines shared by author and research.
/// `weight` is the fraction of current voting power to commit, in basis
/// points.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MakeReview {
    pub author: AccountName,
    pub research_content_id: crate::ids::ResearchContentId,
    pub is_positive: bool,
    pub content: String,
    pub weight: u16,
}

/// Curation vote on an existing review within one discipline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteForReview {
    pub voter: AccountName,
    pub review_id: ReviewId,
    pub discipline_id: DisciplineId,
    pub weight: i16,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributeToTokenSale {
    pub contributor: AccountName,
    pub token_sale_id: TokenSaleId,
    pub amount: Tokens,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResearchTokens {
    pub sender: AccountName,
    pub receiver: AccountName,
    pub research_id: ResearchId,
    pub amount: i64,
}

/// Escrows `amount` from the grantor into a per-block funding stream for the
/// target discipline's active research content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateGrant {
    pub grantor: AccountName,
    pub target_discipline: DisciplineId,
    pub amount: Tokens,
    pub start_time: ChainTime,
    pub end_time: ChainTime,
    pub is_extendable: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestAccountRecovery {
    pub recovery_account: AccountName,
    pub account_to_recover: AccountName,
    pub new_owner_authority: Authority,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverAccount {
    pub account_to_recover: AccountName,
    pub new_owner_authority: Authority,
    pub recent_owner_authority: Authority,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecoveryAccount {
    pub account_to_recover: AccountName,
    pub new_recovery_account: AccountName,
}

/// The closed set of chain operations. Every variant has exactly one
/// registered evaluator; dispatch is by [`OperationKind`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    CreateAccount(CreateAccount),
    UpdateAccount(UpdateAccount),
    Transfer(Transfer),
    TransferToCommonTokens(TransferToCommonTokens),
    WithdrawCommonTokens(WithdrawCommonTokens),
    WitnessUpdate(WitnessUpdate),
    AccountWitnessVote(AccountWitnessVote),
    AccountWitnessProxy(AccountWitnessProxy),
    CreateResearchGroup(CreateResearchGroup),
    CreateProposal(CreateProposal),
    VoteProposal(VoteProposal),
    ApproveResearchGroupInvite(ApproveResearchGroupInvite),
    RejectResearchGroupInvite(RejectResearchGroupInvite),
    MakeReview(MakeReview),
    VoteForReview(VoteForReview),
    ContributeToTokenSale(ContributeToTokenSale),
    TransferResearchTokens(TransferResearchTokens),
    CreateGrant(CreateGrant),
    RequestAccountRecovery(RequestAccountRecovery),
    RecoverAccount(RecoverAccount),
    ChangeRecoveryAccount(ChangeRecoveryAccount),
}

/// Variant tag used as the evaluator-registry key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationKind {
    CreateAccount,
    UpdateAccount,
    Transfer,
    TransferToCommonTokens,
    WithdrawCommonTokens,
    WitnessUpdate,
    AccountWitnessVote,
    AccountWitnessProxy,
    CreateResearchGroup,
    CreateProposal,
    VoteProposal,
    ApproveResearchGroupInvite,
    RejectResearchGroupInvite,
    MakeReview,
    VoteForReview,
    ContributeToTokenSale,
    TransferResearchTokens,
    CreateGrant,
    RequestAccountRecovery,
    RecoverAccount,
    ChangeRecoveryAccount,
}

impl OperationKind {
    pub const ALL: &'static [OperationKind] = &[
        OperationKind::CreateAccount,
        OperationKind::UpdateAccount,
        OperationKind::Transfer,
        OperationKind::TransferToCommonTokens,
        OperationKind::WithdrawCommonTokens,
        OperationKind::WitnessUpdate,
        OperationKind::AccountWitnessVote,
        OperationKind::AccountWitnessProxy,
        OperationKind::CreateResearchGroup,
        OperationKind::CreateProposal,
        OperationKind::VoteProposal,
        OperationKind::ApproveResearchGroupInvite,
        OperationKind::RejectResearchGroupInvite,
        OperationKind::MakeReview,
        OperationKind::VoteForReview,
        OperationKind::ContributeToTokenSale,
        OperationKind::TransferResearchTokens,
        OperationKind::CreateGrant,
        OperationKind::RequestAccountRecovery,
        OperationKind::RecoverAccount,
        OperationKind::ChangeRecoveryAccount,
    ];
}

/// Account authorities a transaction must satisfy, gathered across its
/// operations. `other` carries free-standing authorities (account recovery)
/// that must be satisfied directly by the signature set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequiredAuthorities {
    pub owner: BTreeSet<AccountName>,
    pub active: BTreeSet<AccountName>,
    pub posting: BTreeSet<AccountName>,
    pub other: Vec<Authority>,
}

impl RequiredAuthorities {
    pub fn is_empty(&self) -> bool {
        self.owner.is_empty()
            && self.active.is_empty()
            && self.posting.is_empty()
            && self.other.is_empty()
    }
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::CreateAccount(_) => OperationKind::CreateAccount,
            Operation::UpdateAccount(_) => OperationKind::UpdateAccount,
            Operation::Transfer(_) => OperationKind::Transfer,
            Operation::TransferToCommonTokens(_) => OperationKind::TransferToCommonTokens,
            Operation::WithdrawCommonTokens(_) => OperationKind::WithdrawCommonTokens,
            Operation::WitnessUpdate(_) => OperationKind::WitnessUpdate,
            Operation::AccountWitnessVote(_) => OperationKind::AccountWitnessVote,
            Operation::AccountWitnessProxy(_) => OperationKind::AccountWitnessProxy,
            Operation::CreateResearchGroup(_) => OperationKind::CreateResearchGroup,
            Operation::CreateProposal(_) => OperationKind::CreateProposal,
            Operation::VoteProposal(_) => OperationKind::VoteProposal,
            Operation::ApproveResearchGroupInvite(_) => OperationKind::ApproveResearchGroupInvite,
            Operation::RejectResearchGroupInvite(_) => OperationKind::RejectResearchGroupInvite,
            Operation::MakeReview(_) => OperationKind::MakeReview,
            Operation::VoteForReview(_) => OperationKind::VoteForReview,
            Operation::ContributeToTokenSale(_) => OperationKind::ContributeToTokenSale,
            Operation::TransferResearchTokens(_) => OperationKind::TransferResearchTokens,
            Operation::CreateGrant(_) => OperationKind::CreateGrant,
            Operation::RequestAccountRecovery(_) => OperationKind::RequestAccountRecovery,
            Operation::RecoverAccount(_) => OperationKind::RecoverAccount,
            Operation::ChangeRecoveryAccount(_) => OperationKind::ChangeRecoveryAccount,
        }
    }

    /// Structural validation: everything checkable without chain state.
    pub fn validate(&self) -> Result<(), TypeError> {
        let invalid = |msg: &str| TypeError::InvalidOperation(msg.to_string());
        match self {
            Operation::CreateAccount(op) => {
                validate_account_name(&op.creator)?;
                validate_account_name(&op.new_account_name)?;
                if op.fee.is_negative() {
                    return Err(invalid("account creation fee cannot be negative"));
                }
                op.owner.validate()?;
                op.active.validate()?;
                op.posting.validate()?;
            }
            Operation::UpdateAccount(op) => {
                validate_account_name(&op.account)?;
                if op.owner.is_none()
                    && op.active.is_none()
                    && op.posting.is_none()
                    && op.memo_key.is_none()
                    && op.json_metadata.is_none()
                {
                    return Err(invalid("account update changes nothing"));
                }
                for auth in [&op.owner, &op.active, &op.posting].into_iter().flatten() {
                    auth.validate()?;
                }
            }
            Operation::Transfer(op) => {
                validate_account_name(&op.from)?;
                validate_account_name(&op.to)?;
                if op.from == op.to {
                    return Err(invalid("cannot transfer to self"));
                }
                if !op.amount.is_positive() {
                    return Err(invalid("transfer amount must be positive"));
                }
                if op.memo.len() > MAX_MEMO_SIZE {
                    return Err(invalid("memo too long"));
                }
            }
            Operation::TransferToCommonTokens(op) => {
                validate_account_name(&op.from)?;
                validate_account_name(&op.to)?;
                if !op.amount.is_positive() {
                    return Err(invalid("amount must be positive"));
                }
            }
            Operation::WithdrawCommonTokens(op) => {
                validate_account_name(&op.account)?;
                if op.total_amount.is_negative() {
                    return Err(invalid("withdraw amount cannot be negative"));
                }
            }
            Operation::WitnessUpdate(op) => {
                validate_account_name(&op.owner)?;
                if op.url.is_empty() {
                    return Err(invalid("witness url must be non-empty"));
                }
                if op.props.maximum_block_size < crate::block::MIN_BLOCK_SIZE_LIMIT {
                    return Err(invalid("maximum block size below protocol minimum"));
                }
                if op.props.account_creation_fee.is_negative() {
                    return Err(invalid("account creation fee cannot be negative"));
                }
            }
            Operation::AccountWitnessVote(op) => {
                validate_account_name(&op.account)?;
                validate_account_name(&op.witness)?;
            }
            Operation::AccountWitnessProxy(op) => {
                validate_account_name(&op.account)?;
                if !op.proxy.is_empty() {
                    validate_account_name(&op.proxy)?;
                    if op.proxy == op.account {
                        return Err(invalid("cannot proxy to self"));
                    }
                }
            }
            Operation::CreateResearchGroup(op) => {
                validate_account_name(&op.creator)?;
                if op.name.is_empty() || op.permlink.is_empty() {
                    return Err(invalid("group name and permlink must be non-empty"));
                }
                if op.name.len() > MAX_TITLE_SIZE {
                    return Err(invalid("group name too long"));
                }
                validate_percent(op.quorum_percent)?;
                if op.quorum_percent == 0 {
                    return Err(invalid("quorum cannot be zero"));
                }
            }
            Operation::CreateProposal(op) => {
                validate_account_name(&op.creator)?;
                op.action.validate()?;
            }
            Operation::VoteProposal(op) => {
                validate_account_name(&op.voter)?;
            }
            Operation::ApproveResearchGroupInvite(op) => {
                validate_account_name(&op.account)?;
            }
            Operation::RejectResearchGroupInvite(op) => {
                validate_account_name(&op.account)?;
            }
            Operation::MakeReview(op) => {
                validate_account_name(&op.author)?;
                if op.content.is_empty() {
                    return Err(invalid("review content must be non-empty"));
                }
                if op.weight == 0 {
                    return Err(invalid("review weight cannot be zero"));
                }
                validate_percent(op.weight)?;
            }
            Operation::VoteForReview(op) => {
                validate_account_name(&op.voter)?;
                if op.weight == 0 {
                    return Err(invalid("vote weight cannot be zero"));
                }
                if op.weight.unsigned_abs() > crate::asset::FULL_PERCENT {
                    return Err(invalid("vote weight exceeds 100 percent"));
                }
            }
            Operation::ContributeToTokenSale(op) => {
                validate_account_name(&op.contributor)?;
                if !op.amount.is_positive() {
                    return Err(invalid("contribution must be positive"));
                }
            }
            Operation::TransferResearchTokens(op) => {
                validate_account_name(&op.sender)?;
                validate_account_name(&op.receiver)?;
                if op.sender == op.receiver {
                    return Err(invalid("cannot transfer research tokens to self"));
                }
                if op.amount <= 0 {
                    return Err(invalid("research token amount must be positive"));
                }
            }
            Operation::CreateGrant(op) => {
                validate_account_name(&op.grantor)?;
                if !op.amount.is_positive() {
                    return Err(invalid("grant amount must be positive"));
                }
                if op.end_time <= op.start_time {
                    return Err(invalid("grant must end after it starts"));
                }
            }
            Operation::RequestAccountRecovery(op) => {
                validate_account_name(&op.recovery_account)?;
                validate_account_name(&op.account_to_recover)?;
                op.new_owner_authority.validate()?;
            }
            Operation::RecoverAccount(op) => {
                validate_account_name(&op.account_to_recover)?;
                op.new_owner_authority.validate()?;
                op.recent_owner_authority.validate()?;
                if op.new_owner_authority == op.recent_owner_authority {
                    return Err(invalid("new owner authority must differ from the recent one"));
                }
            }
            Operation::ChangeRecoveryAccount(op) => {
                validate_account_name(&op.account_to_recover)?;
                validate_account_name(&op.new_recovery_account)?;
            }
        }
        Ok(())
    }

    /// The authorities this operation requires, by tier.
    pub fn required_authorities(&self, into: &mut RequiredAuthorities) {
        match self {
            Operation::CreateAccount(op) => {
                into.active.insert(op.creator.clone());
            }
            Operation::UpdateAccount(op) => {
                // Touching the owner authority itself demands the owner tier.
                if op.owner.is_some() {
                    into.owner.insert(op.account.clone());
                } else {
                    into.active.insert(op.account.clone());
                }
            }
            Operation::Transfer(op) => {
                into.active.insert(op.from.clone());
            }
            Operation::TransferToCommonTokens(op) => {
                into.active.insert(op.from.clone());
            }
            Operation::WithdrawCommonTokens(op) => {
                into.active.insert(op.account.clone());
            }
            Operation::WitnessUpdate(op) => {
                into.active.insert(op.owner.clone());
            }
            Operation::AccountWitnessVote(op) => {
                into.active.insert(op.account.clone());
            }
            Operation::AccountWitnessProxy(op) => {
                into.active.insert(op.account.clone());
            }
            Operation::CreateResearchGroup(op) => {
                into.active.insert(op.creator.clone());
            }
            Operation::CreateProposal(op) => {
                into.active.insert(op.creator.clone());
            }
            Operation::VoteProposal(op) => {
                into.active.insert(op.voter.clone());
            }
            Operation::ApproveResearchGroupInvite(op) => {
                into.active.insert(op.account.clone());
            }
            Operation::RejectResearchGroupInvite(op) => {
                into.active.insert(op.account.clone());
            }
            Operation::MakeReview(op) => {
                into.posting.insert(op.author.clone());
            }
            Operation::VoteForReview(op) => {
                into.posting.insert(op.voter.clone());
            }
            Operation::ContributeToTokenSale(op) => {
                into.active.insert(op.contributor.clone());
            }
            Operation::TransferResearchTokens(op) => {
                into.active.insert(op.sender.clone());
            }
            Operation::CreateGrant(op) => {
                into.active.insert(op.grantor.clone());
            }
            Operation::RequestAccountRecovery(op) => {
                into.active.insert(op.recovery_account.clone());
            }
            Operation::RecoverAccount(op) => {
                // Both authorities must be proven by raw signatures; neither
                // is looked up from chain state.
                into.other.push(op.new_owner_authority.clone());
                into.other.push(op.recent_owner_authority.clone());
            }
            Operation::ChangeRecoveryAccount(op) => {
                into.owner.insert(op.account_to_recover.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(seed: u8) -> PublicKey {
        PublicKey([seed; 32])
    }

    fn transfer(from: &str, to: &str, amount: i64) -> Operation {
        Operation::Transfer(Transfer {
            from: from.to_string(),
            to: to.to_string(),
            amount: Tokens::new(amount),
            memo: String::new(),
        })
    }

    #[test]
    fn every_kind_is_listed_once() {
        assert_eq!(OperationKind::ALL.len(), 21);
        let unique: BTreeSet<_> = OperationKind::ALL.iter().collect();
        assert_eq!(unique.len(), OperationKind::ALL.len());
    }

    #[test]
    fn transfer_validation() {
        assert!(transfer("alice", "bobby", 10).validate().is_ok());
        assert!(transfer("alice", "alice", 10).validate().is_err());
        assert!(transfer("alice", "bobby", 0).validate().is_err());
        assert!(transfer("alice", "bobby", -5).validate().is_err());
    }

    #[test]
    fn transfer_requires_active_of_sender() {
        let mut req = RequiredAuthorities::default();
        transfer("alice", "bobby", 10).required_authorities(&mut req);
        assert!(req.active.contains("alice"));
        assert!(req.owner.is_empty());
        assert!(req.posting.is_empty());
    }

    #[test]
    fn owner_change_escalates_to_owner_tier() {
        let op = Operation::UpdateAccount(UpdateAccount {
            account: "alice".into(),
            owner: Some(Authority::single_key(key(1))),
            active: None,
            posting: None,
            memo_key: None,
            json_metadata: None,
        });
        let mut req = RequiredAuthorities::default();
        op.required_authorities(&mut req);
        assert!(req.owner.contains("alice"));
        assert!(req.active.is_empty());
    }

    #[test]
    fn review_weight_bounds() {
        let mut op = MakeReview {
            author: "carol".into(),
            research_content_id: 1,
            is_positive: true,
            content: "solid methodology".into(),
            weight: 10_000,
        };
        assert!(Operation::MakeReview(op.clone()).validate().is_ok());
        op.weight = 10_001;
        assert!(Operation::MakeReview(op.clone()).validate().is_err());
        op.weight = 0;
        assert!(Operation::MakeReview(op).validate().is_err());
    }

    #[test]
    fn recover_account_uses_other_authorities() {
        let op = Operation::RecoverAccount(RecoverAccount {
            account_to_recover: "alice".into(),
            new_owner_authority: Authority::single_key(key(1)),
            recent_owner_authority: Authority::single_key(key(2)),
        });
        let mut req = RequiredAuthorities::default();
        op.required_authorities(&mut req);
        assert_eq!(req.other.len(), 2);
        assert!(req.owner.is_empty() && req.active.is_empty());
    }

    #[test]
    fn operation_serde_roundtrip() {
        let op = transfer("alice", "bobby", 42);
        let json = serde_json::to_string(&op).unwrap();
        let parsed: Operation = serde_json::from_str(&json).unwrap();
        assert_eq!(op, parsed);
        assert_eq!(parsed.kind(), OperationKind::Transfer);
    }
}
