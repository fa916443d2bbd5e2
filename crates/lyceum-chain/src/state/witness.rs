use lyceum_store::StoreObject;
use lyceum_types::{AccountName, ChainProperties, ChainTime, PublicKey, Version};

/// How a witness earned its slot in the current schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduleKind {
    /// One of the top witnesses by approval votes.
    TopVoted,
    /// Won the virtual-time race reserved for non-top witnesses.
    Timeshare,
    /// Not in the current schedule.
    Unscheduled,
}

/// A block-producer candidate.
///
/// The `virtual_*` fields drive the timeshare race: a witness advances
/// through a virtual lap at a rate proportional to its votes, and the one
/// whose lap completes first takes the timeshare slot of the next round.
#[derive(Clone, Debug, PartialEq)]
pub struct Witness {
    pub id: u64,
    pub owner: AccountName,
    pub url: String,
    /// Key blocks from this witness must be signed with. Cleared as a miss
    /// penalty; a witness with a cleared key cannot produce until it
    /// republishes one.
    pub signing_key: PublicKey,
    pub props: ChainProperties,
    pub votes: i64,
    pub schedule: ScheduleKind,

    pub total_missed: u32,
    pub last_confirmed_block_num: u32,
    pub last_aslot: u64,

    pub running_version: Version,
    pub hardfork_version_vote: Version,
    pub hardfork_time_vote: ChainTime,

    pub virtual_last_update: u128,
    pub virtual_position: u128,
    pub virtual_scheduled_time: u128,

    pub created: ChainTime,
}

impl Default for Witness {
    fn default() -> Self {
        Self {
            id: 0,
            owner: AccountName::new(),
            url: String::new(),
            signing_key: PublicKey([0u8; 32]),
            props: ChainProperties::default(),
            votes: 0,
            schedule: ScheduleKind::Unscheduled,
            total_missed: 0,
            last_confirmed_block_num: 0,
            last_aslot: 0,
            running_version: Version::default(),
            hardfork_version_vote: Version::default(),
            hardfork_time_vote: ChainTime::ZERO,
            virtual_last_update: 0,
            virtual_position: 0,
            virtual_scheduled_time: u128::MAX,
            created: ChainTime::ZERO,
        }
    }
}

impl StoreObject for Witness {
    const TYPE_NAME: &'static str = "witness";

    fn id(&self) -> u64 {
        self.id
    }
}

/// One account's approval of one witness. The weight is the voter's
/// common-token stake (plus single-level proxied stake) at vote time and is
/// what gets subtracted when the vote is withdrawn.
#[derive(Clone, Debug, PartialEq)]
pub struct WitnessVote {
    pub id: u64,
    pub witness: AccountName,
    pub account: AccountName,
    pub weight: i64,
}

impl StoreObject for WitnessVote {
    const TYPE_NAME: &'static str = "witness vote";

    fn id(&self) -> u64 {
        self.id
    }
}

/// The active production schedule. Singleton at id 0.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WitnessSchedule {
    pub id: u64,
    /// Producer order for the current round, already shuffled.
    pub current_shuffled_witnesses: Vec<AccountName>,
    pub num_scheduled_witnesses: u8,
    /// Medians of the scheduled witnesses' published chain properties.
    pub median_props: ChainProperties,
    pub majority_version: Version,
    pub current_virtual_time: u128,
    pub next_shuffle_block_num: u32,
    pub witness_pay_normalization_factor: i64,
}

impl StoreObject for WitnessSchedule {
    const TYPE_NAME: &'static str = "witness schedule";

    fn id(&self) -> u64 {
        self.id
    }
}
