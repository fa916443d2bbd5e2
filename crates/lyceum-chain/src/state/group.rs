use lyceum_store::StoreObject;
use lyceum_types::{
    AccountName, ChainTime, ProposalAction, ProposalId, ResearchGroupId, ResearchId, Tokens,
};

/// A research collective. Personal groups are created automatically with
/// each account and cannot take members.
#[derive(Clone, Debug, PartialEq)]
pub struct ResearchGroup {
    pub id: u64,
    pub name: String,
    pub permlink: String,
    pub description: String,
    /// Share of group-token weight (basis points) a proposal must gather.
    pub quorum_percent: u16,
    pub balance: Tokens,
    pub total_tokens_amount: i64,
    pub is_personal: bool,
}

impl StoreObject for ResearchGroup {
    const TYPE_NAME: &'static str = "research group";

    fn id(&self) -> u64 {
        self.id
    }
}

/// Membership stake in a group, unique per `(group, owner)`.
#[derive(Clone, Debug, PartialEq)]
pub struct ResearchGroupToken {
    pub id: u64,
    pub research_group_id: ResearchGroupId,
    pub owner: AccountName,
    pub amount: i64,
}

impl StoreObject for ResearchGroupToken {
    const TYPE_NAME: &'static str = "research group token";

    fn id(&self) -> u64 {
        self.id
    }
}

/// An individual holder's share units of one research, unique per
/// `(account, research)`. Share units are out of 10000.
#[derive(Clone, Debug, PartialEq)]
pub struct ResearchToken {
    pub id: u64,
    pub account: AccountName,
    pub research_id: ResearchId,
    pub amount: i64,
}

impl StoreObject for ResearchToken {
    const TYPE_NAME: &'static str = "research token";

    fn id(&self) -> u64 {
        self.id
    }
}

/// A pending group decision. Executed the moment enough member weight has
/// voted for it; expired proposals are pruned unexecuted.
#[derive(Clone, Debug, PartialEq)]
pub struct Proposal {
    pub id: u64,
    pub research_group_id: ResearchGroupId,
    pub creator: AccountName,
    pub action: ProposalAction,
    /// Quorum captured from the group at creation time.
    pub quorum_percent: u16,
    pub creation_time: ChainTime,
    pub expiration_time: ChainTime,
}

impl StoreObject for Proposal {
    const TYPE_NAME: &'static str = "proposal";

    fn id(&self) -> u64 {
        self.id
    }
}

/// One member's vote on a proposal, weighted by their group tokens at vote
/// time. Unique per `(proposal, voter)`.
#[derive(Clone, Debug, PartialEq)]
pub struct ProposalVote {
    pub id: u64,
    pub proposal_id: ProposalId,
    pub voter: AccountName,
    pub weight: i64,
    pub voting_time: ChainTime,
}

impl StoreObject for ProposalVote {
    const TYPE_NAME: &'static str = "proposal vote";

    fn id(&self) -> u64 {
        self.id
    }
}

/// A standing offer of membership, carrying the group tokens the invitee
/// will receive on approval.
#[derive(Clone, Debug, PartialEq)]
pub struct Invite {
    pub id: u64,
    pub account: AccountName,
    pub research_group_id: ResearchGroupId,
    pub token_amount: i64,
    pub expiration: ChainTime,
}

impl StoreObject for Invite {
    const TYPE_NAME: &'static str = "research group invite";

    fn id(&self) -> u64 {
        self.id
    }
}
