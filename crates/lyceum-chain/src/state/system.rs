use lyceum_store::StoreObject;
use lyceum_types::{BlockId, ChainTime, TransactionId};

/// Dedup record of an applied transaction, kept until its expiration
/// passes.
#[derive(Clone, Debug, PartialEq)]
pub struct TransactionDedup {
    pub id: u64,
    pub trx_id: TransactionId,
    pub expiration: ChainTime,
}

impl StoreObject for TransactionDedup {
    const TYPE_NAME: &'static str = "transaction dedup";

    fn id(&self) -> u64 {
        self.id
    }
}

/// One slot of the 65536-entry block-id ring that anchors TaPoS reference
/// checks. Row id is `block_num & 0xffff`.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockSummary {
    pub id: u64,
    pub block_id: BlockId,
}

impl StoreObject for BlockSummary {
    const TYPE_NAME: &'static str = "block summary";

    fn id(&self) -> u64 {
        self.id
    }
}
