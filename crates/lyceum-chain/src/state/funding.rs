use lyceum_store::StoreObject;
use lyceum_types::{AccountName, ChainTime, DisciplineId, ResearchId, TokenSaleId, Tokens};

/// Lifecycle of a research token sale.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenSaleStatus {
    /// Created but not yet at its start time.
    Inactive,
    /// Accepting contributions.
    Active,
    /// Settled above the soft cap; tokens distributed pro-rata.
    Finished,
    /// Settled below the soft cap; contributions refunded.
    Expired,
}

/// A crowdsale of research share units against contributed currency.
///
/// `balance_tokens` is the escrowed share units taken out of the research's
/// `owned_tokens` at creation; `total_amount` is the currency contributed so
/// far and part of the supply conservation sum until settlement.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenSale {
    pub id: u64,
    pub research_id: ResearchId,
    pub start_time: ChainTime,
    pub end_time: ChainTime,
    pub balance_tokens: i64,
    pub soft_cap: Tokens,
    pub hard_cap: Tokens,
    pub total_amount: Tokens,
    pub status: TokenSaleStatus,
}

impl StoreObject for TokenSale {
    const TYPE_NAME: &'static str = "research token sale";

    fn id(&self) -> u64 {
        self.id
    }
}

/// One contributor's stake in a sale, unique per `(sale, contributor)`.
/// Removed when the sale settles.
#[derive(Clone, Debug, PartialEq)]
pub struct SaleContribution {
    pub id: u64,
    pub token_sale_id: TokenSaleId,
    pub contributor: AccountName,
    pub amount: Tokens,
    pub contribution_time: ChainTime,
}

impl StoreObject for SaleContribution {
    const TYPE_NAME: &'static str = "token sale contribution";

    fn id(&self) -> u64 {
        self.id
    }
}

/// An expert-funding grant streaming currency into one discipline's active
/// content, block by block.
#[derive(Clone, Debug, PartialEq)]
pub struct Grant {
    pub id: u64,
    pub grantor: AccountName,
    pub target_discipline: DisciplineId,
    /// Remaining escrow; refunded to the grantor on expiry.
    pub balance: Tokens,
    pub per_block: Tokens,
    pub start_time: ChainTime,
    pub end_time: ChainTime,
    /// Extendable grants push their end time forward while the discipline
    /// has no active content instead of burning idle blocks.
    pub is_extendable: bool,
    pub created: ChainTime,
}

impl StoreObject for Grant {
    const TYPE_NAME: &'static str = "grant";

    fn id(&self) -> u64 {
        self.id
    }
}
