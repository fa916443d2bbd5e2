use std::collections::BTreeSet;

use lyceum_store::StoreObject;
use lyceum_types::{
    AccountName, ChainTime, DisciplineId, ResearchContentId, ResearchContentKind,
    ResearchGroupId, ResearchId,
};

/// A node in the discipline tree. Id 0 is the common root, which collects
/// no expertise and is excluded from reward distribution.
#[derive(Clone, Debug, PartialEq)]
pub struct Discipline {
    pub id: u64,
    pub parent_id: DisciplineId,
    pub name: String,
    /// Sum of the modifier-scaled review weight of this discipline's
    /// currently active content. The denominator of the per-discipline
    /// reward split.
    pub total_active_weight: i64,
}

impl StoreObject for Discipline {
    const TYPE_NAME: &'static str = "discipline";

    fn id(&self) -> u64 {
        self.id
    }
}

/// A research project owned by a group.
#[derive(Clone, Debug, PartialEq)]
pub struct Research {
    pub id: u64,
    pub research_group_id: ResearchGroupId,
    pub title: String,
    pub abstract_text: String,
    pub permlink: String,
    /// Share of content rewards redirected to this research's reviews.
    pub review_share_percent: u16,
    pub last_review_share_update: ChainTime,
    /// Compensation share a dropped-out member keeps, in research tokens.
    pub dropout_compensation_percent: u16,
    pub is_finished: bool,
    /// Share units (out of 10000) not held by individual token holders;
    /// payouts on these go to the owning group's balance.
    pub owned_tokens: i64,
    pub created: ChainTime,
}

impl StoreObject for Research {
    const TYPE_NAME: &'static str = "research";

    fn id(&self) -> u64 {
        self.id
    }
}

/// Links a research to one of its disciplines.
#[derive(Clone, Debug, PartialEq)]
pub struct ResearchDisciplineRelation {
    pub id: u64,
    pub research_id: ResearchId,
    pub discipline_id: DisciplineId,
}

impl StoreObject for ResearchDisciplineRelation {
    const TYPE_NAME: &'static str = "research discipline relation";

    fn id(&self) -> u64 {
        self.id
    }
}

/// Where a piece of content stands in its review-window lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivityState {
    /// A review window is open: reviews count and rewards accrue.
    Active,
    /// Between rounds, waiting for the next window to open.
    Pending,
    /// All rounds done. Terminal.
    Closed,
}

/// Published research material: announcements, milestones, final results.
///
/// `activity_window_start`/`end` bound the current (or next, when pending)
/// review round; both are parked at [`ChainTime::MAX`] once closed.
#[derive(Clone, Debug, PartialEq)]
pub struct ResearchContent {
    pub id: u64,
    pub research_id: ResearchId,
    pub kind: ResearchContentKind,
    pub title: String,
    /// External content hash; the chain stores no material bodies.
    pub content: String,
    pub authors: BTreeSet<AccountName>,
    pub references: Vec<ResearchContentId>,
    pub created_at: ChainTime,

    pub activity_round: u16,
    pub activity_state: ActivityState,
    pub activity_window_start: ChainTime,
    pub activity_window_end: ChainTime,
}

impl ResearchContent {
    pub fn is_active(&self) -> bool {
        self.activity_state == ActivityState::Active
    }
}

impl StoreObject for ResearchContent {
    const TYPE_NAME: &'static str = "research content";

    fn id(&self) -> u64 {
        self.id
    }
}
