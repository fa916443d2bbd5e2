use serde::{Deserialize, Serialize};

use crate::account::{validate_account_name, AccountName};
use crate::asset::{validate_percent, Tokens};
use crate::error::TypeError;
use crate::ids::{DisciplineId, ResearchContentId, ResearchId};
use crate::time::ChainTime;

/// Kinds of research content. The kind selects the activity-window schedule:
/// final results run three review rounds, everything else two.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResearchContentKind {
    Announcement,
    MilestoneArticle,
    MilestoneBook,
    MilestoneData,
    FinalResult,
}

impl ResearchContentKind {
    pub fn is_final_result(self) -> bool {
        matches!(self, ResearchContentKind::FinalResult)
    }

    /// Announcement and final-result authorship is attributed to the whole
    /// research group; milestone kinds credit the listed authors.
    pub fn credits_whole_group(self) -> bool {
        matches!(
            self,
            ResearchContentKind::Announcement | ResearchContentKind::FinalResult
        )
    }
}

/// A group-governance action carried by a proposal and executed when the
/// proposal reaches its group's quorum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalAction {
    InviteMember {
        name: AccountName,
        token_amount: i64,
    },
    DropoutMember {
        name: AccountName,
    },
    ChangeQuorum {
        quorum_percent: u16,
    },
    ChangeResearchReviewShare {
        research_id: ResearchId,
        review_share_percent: u16,
    },
    StartResearch {
        title: String,
        abstract_text: String,
        permlink: String,
        disciplines: Vec<DisciplineId>,
        review_share_percent: u16,
        dropout_compensation_percent: u16,
    },
    SendFunds {
        recipient: AccountName,
        amount: Tokens,
    },
    RebalanceGroupTokens {
        deltas: Vec<(AccountName, i64)>,
    },
    CreateResearchMaterial {
        research_id: ResearchId,
        kind: ResearchContentKind,
        title: String,
        content: String,
        authors: Vec<AccountName>,
        references: Vec<ResearchContentId>,
    },
    StartTokenSale {
        research_id: ResearchId,
        start_time: ChainTime,
        end_time: ChainTime,
        share_units_for_sale: i64,
        soft_cap: Tokens,
        hard_cap: Tokens,
    },
}

impl ProposalAction {
    pub fn validate(&self) -> Result<(), TypeError> {
        let invalid = |msg: &str| TypeError::InvalidOperation(msg.to_string());
        match self {
            ProposalAction::InviteMember { name, token_amount } => {
                validate_account_name(name)?;
                if *token_amount <= 0 {
                    return Err(invalid("invite token amount must be positive"));
                }
            }
            ProposalAction::DropoutMember { name } => {
                validate_account_name(name)?;
            }
            ProposalAction::ChangeQuorum { quorum_percent } => {
                validate_percent(*quorum_percent)?;
                if *quorum_percent == 0 {
                    return Err(invalid("quorum cannot be zero"));
                }
            }
            ProposalAction::ChangeResearchReviewShare {
                review_share_percent,
                ..
            } => {
                validate_percent(*review_share_percent)?;
            }
            ProposalAction::StartResearch {
                title,
                permlink,
                disciplines,
                review_share_percent,
                dropout_compensation_percent,
                ..
            } => {
                if title.is_empty() || permlink.is_empty() {
                    return Err(invalid("research title and permlink must be non-empty"));
                }
                if disciplines.is_empty() {
                    return Err(invalid("research needs at least one discipline"));
                }
                validate_percent(*review_share_percent)?;
                validate_percent(*dropout_compensation_percent)?;
            }
            ProposalAction::SendFunds { recipient, amount } => {
                validate_account_name(recipient)?;
                if !amount.is_positive() {
                    return Err(invalid("send amount must be positive"));
                }
            }
            ProposalAction::RebalanceGroupTokens { deltas } => {
                if deltas.is_empty() {
                    return Err(invalid("rebalance needs at least one delta"));
                }
                for (name, _) in deltas {
                    validate_account_name(name)?;
                }
                let net: i64 = deltas.iter().map(|(_, d)| d).sum();
                if net != 0 {
                    return Err(invalid("rebalance deltas must sum to zero"));
                }
            }
            ProposalAction::CreateResearchMaterial {
                title,
                content,
                kind,
                authors,
                ..
            } => {
                if title.is_empty() || content.is_empty() {
                    return Err(invalid("material title and content must be non-empty"));
                }
                if !kind.credits_whole_group() && authors.is_empty() {
                    return Err(invalid("milestone material needs explicit authors"));
                }
                for author in authors {
                    validate_account_name(author)?;
                }
            }
            ProposalAction::StartTokenSale {
                start_time,
                end_time,
                share_units_for_sale,
                soft_cap,
                hard_cap,
                ..
            } => {
                if end_time <= start_time {
                    return Err(invalid("token sale must end after it starts"));
                }
                if *share_units_for_sale <= 0 {
                    return Err(invalid("token sale must offer a positive share amount"));
                }
                if !soft_cap.is_positive() {
                    return Err(invalid("soft cap must be positive"));
                }
                if hard_cap < soft_cap {
                    return Err(invalid("hard cap below soft cap"));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebalance_must_net_to_zero() {
        let bad = ProposalAction::RebalanceGroupTokens {
            deltas: vec![("alice".into(), 10), ("bobby".into(), -5)],
        };
        assert!(bad.validate().is_err());

        let good = ProposalAction::RebalanceGroupTokens {
            deltas: vec![("alice".into(), 10), ("bobby".into(), -10)],
        };
        assert!(good.validate().is_ok());
    }

    #[test]
    fn token_sale_caps_are_ordered() {
        let action = ProposalAction::StartTokenSale {
            research_id: 1,
            start_time: ChainTime::from_secs(100),
            end_time: ChainTime::from_secs(200),
            share_units_for_sale: 500,
            soft_cap: Tokens::new(100),
            hard_cap: Tokens::new(50),
        };
        assert!(action.validate().is_err());
    }

    #[test]
    fn milestone_material_requires_authors() {
        let action = ProposalAction::CreateResearchMaterial {
            research_id: 1,
            kind: ResearchContentKind::MilestoneData,
            title: "dataset".into(),
            content: "hash".into(),
            authors: vec![],
            references: vec![],
        };
        assert!(action.validate().is_err());
    }

    #[test]
    fn announcement_material_may_omit_authors() {
        let action = ProposalAction::CreateResearchMaterial {
            research_id: 1,
            kind: ResearchContentKind::Announcement,
            title: "announcement".into(),
            content: "hash".into(),
            authors: vec![],
            references: vec![],
        };
        assert!(action.validate().is_ok());
    }
}
