use std::fmt;

use serde::{Deserialize, Serialize};

use crate::account::AccountName;
use crate::error::TypeError;
use crate::ids::{domain_digest, BlockId};
use crate::time::ChainTime;
use crate::transaction::{SignatureBytes, SignedTransaction};

pub const MIN_BLOCK_SIZE_LIMIT: u32 = crate::transaction::MAX_TRANSACTION_SIZE as u32;

const BLOCK_DOMAIN: &[u8] = b"lyceum-block-v1:";

/// Protocol version a node reports and votes with.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u16,
}

impl Version {
    pub const fn new(major: u8, minor: u8, patch: u16) -> Self {
        Self { major, minor, patch }
    }

    /// The hardfork-relevant part: patch releases never fork.
    pub fn hardfork_version(self) -> Version {
        Version::new(self.major, self.minor, 0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Consensus metadata a witness may attach to a block header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockHeaderExtension {
    /// The producing witness's running software version.
    VersionReport(Version),
    /// A vote to schedule a hardfork version at a time.
    HardforkVote { version: Version, time: ChainTime },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub previous: BlockId,
    pub timestamp: ChainTime,
    pub witness: AccountName,
    /// Merkle root over the contained transactions' digests.
    pub transaction_merkle_root: [u8; 32],
    pub extensions: Vec<BlockHeaderExtension>,
}

impl BlockHeader {
    /// Height of the block carrying this header.
    pub fn block_num(&self) -> u32 {
        self.previous.block_num() + 1
    }

    /// The digest the witness signs.
    pub fn sig_digest(&self) -> [u8; 32] {
        domain_digest(BLOCK_DOMAIN, self)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBlock {
    pub header: BlockHeader,
    pub witness_signature: SignatureBytes,
    pub transactions: Vec<SignedTransaction>,
}

impl SignedBlock {
    pub fn block_num(&self) -> u32 {
        self.header.block_num()
    }

    /// Block id: digest of the signed header with the height embedded.
    pub fn id(&self) -> BlockId {
        let digest = domain_digest(BLOCK_DOMAIN, &(&self.header, &self.witness_signature));
        BlockId::from_digest(digest, self.block_num())
    }

    pub fn encoded_size(&self) -> usize {
        bincode::serialized_size(self).expect("blocks always serialize") as usize
    }

    pub fn validate(&self) -> Result<(), TypeError> {
        for tx in &self.transactions {
            tx.validate()?;
        }
        Ok(())
    }
}
