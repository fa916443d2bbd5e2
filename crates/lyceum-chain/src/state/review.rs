use std::collections::{BTreeMap, BTreeSet};

use lyceum_store::StoreObject;
use lyceum_types::{
    AccountName, ChainTime, DisciplineId, ResearchContentId, ResearchId, ReviewId, Tokens,
};

/// One account's expertise in one discipline, unique per
/// `(account, discipline)` pair.
///
/// `amount` is the expertise stake earned through rewarded work; it never
/// decreases when used. `voting_power` is the regenerating budget (in basis
/// points) that throttles how often the stake can back reviews and votes.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpertToken {
    pub id: u64,
    pub account: AccountName,
    pub discipline_id: DisciplineId,
    pub amount: Tokens,
    pub voting_power: u16,
    pub last_vote_time: ChainTime,
}

impl StoreObject for ExpertToken {
    const TYPE_NAME: &'static str = "expert token";

    fn id(&self) -> u64 {
        self.id
    }
}

/// Accumulated modifier-scaled review weight of one content in one
/// discipline. Unique per `(content, discipline)` pair.
#[derive(Clone, Debug, PartialEq)]
pub struct TotalVotes {
    pub id: u64,
    pub research_content_id: ResearchContentId,
    pub discipline_id: DisciplineId,
    pub research_id: ResearchId,
    pub total_weight: i64,
}

impl StoreObject for TotalVotes {
    const TYPE_NAME: &'static str = "total votes";

    fn id(&self) -> u64 {
        self.id
    }
}

/// An expert's assessment of one content, unique per `(content, author)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Review {
    pub id: u64,
    pub research_content_id: ResearchContentId,
    pub author: AccountName,
    pub is_positive: bool,
    /// External hash of the review body.
    pub content: String,
    pub created_at: ChainTime,
    /// Raw expertise stake committed per discipline at review time.
    pub expertise_spent: BTreeMap<DisciplineId, i64>,
    pub disciplines: BTreeSet<DisciplineId>,
}

impl StoreObject for Review {
    const TYPE_NAME: &'static str = "review";

    fn id(&self) -> u64 {
        self.id
    }
}

/// A curation vote on a review, unique per `(review, discipline, voter)`.
/// `weight` already carries the reverse-auction discount.
#[derive(Clone, Debug, PartialEq)]
pub struct ReviewVote {
    pub id: u64,
    pub review_id: ReviewId,
    pub discipline_id: DisciplineId,
    pub voter: AccountName,
    pub weight: i64,
    pub voting_time: ChainTime,
}

impl StoreObject for ReviewVote {
    const TYPE_NAME: &'static str = "review vote";

    fn id(&self) -> u64 {
        self.id
    }
}

/// Escrowed rewards of one content in one discipline, accumulated per block
/// while the content is active and drained when its review window closes.
#[derive(Clone, Debug, PartialEq)]
pub struct ContentRewardPool {
    pub id: u64,
    pub research_content_id: ResearchContentId,
    pub discipline_id: DisciplineId,
    pub reward_share: Tokens,
    pub expertise_share: Tokens,
}

impl StoreObject for ContentRewardPool {
    const TYPE_NAME: &'static str = "content reward pool";

    fn id(&self) -> u64 {
        self.id
    }
}
