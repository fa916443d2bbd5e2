use lyceum_store::StoreObject;
use lyceum_types::{AccountName, BlockId, ChainTime, Tokens, Version};

/// Chain-wide counters updated once per block. Singleton at id 0.
///
/// The supply fields are the anchors of the conservation invariant: the
/// current supply always equals the sum of every liquid balance, escrow
/// pool, and the common-tokens fund; the fund in turn always equals the sum
/// of per-account common-token balances.
#[derive(Clone, Debug, PartialEq)]
pub struct DynamicGlobalProperties {
    pub id: u64,
    pub head_block_number: u32,
    pub head_block_id: BlockId,
    pub time: ChainTime,
    pub current_witness: AccountName,

    pub current_supply: Tokens,
    pub common_tokens_fund: Tokens,
    pub total_common_tokens: Tokens,
    pub total_expertise_tokens: Tokens,
    /// Expertise created by reward distribution in the current block.
    pub expertise_minted_this_block: Tokens,
    /// Expertise stake consumed by reviews and review votes in the current
    /// block.
    pub expertise_consumed_this_block: Tokens,

    pub maximum_block_size: u32,
    /// Absolute production slot of the head block, counted from genesis
    /// across missed slots.
    pub current_aslot: u64,
    /// Bitmap of the last 128 slots; bit 0 is the most recent slot, set when
    /// it produced a block.
    pub recent_slots_filled: u128,
    /// Population count of `recent_slots_filled`.
    pub participation_count: u8,
    pub last_irreversible_block_num: u32,
}

impl Default for DynamicGlobalProperties {
    fn default() -> Self {
        Self {
            id: 0,
            head_block_number: 0,
            head_block_id: BlockId::default(),
            time: ChainTime::ZERO,
            current_witness: AccountName::new(),
            current_supply: Tokens::ZERO,
            common_tokens_fund: Tokens::ZERO,
            total_common_tokens: Tokens::ZERO,
            total_expertise_tokens: Tokens::ZERO,
            expertise_minted_this_block: Tokens::ZERO,
            expertise_consumed_this_block: Tokens::ZERO,
            maximum_block_size: lyceum_types::MIN_BLOCK_SIZE_LIMIT * 2,
            current_aslot: 0,
            recent_slots_filled: 0,
            participation_count: 0,
            last_irreversible_block_num: 0,
        }
    }
}

impl StoreObject for DynamicGlobalProperties {
    const TYPE_NAME: &'static str = "dynamic global properties";

    fn id(&self) -> u64 {
        self.id
    }
}

/// Hardfork scheduling state. Singleton at id 0.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HardforkProperties {
    pub id: u64,
    /// Activation time of every processed hardfork; index 0 is genesis.
    pub processed_hardfork_times: Vec<ChainTime>,
    pub current_hardfork_version: Version,
    /// Version the scheduled witnesses have agreed to fork to, or the
    /// current version when nothing is scheduled.
    pub next_hardfork_version: Version,
    pub next_hardfork_time: ChainTime,
}

impl StoreObject for HardforkProperties {
    const TYPE_NAME: &'static str = "hardfork properties";

    fn id(&self) -> u64 {
        self.id
    }
}
