use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Domain-separated BLAKE3 over the bincode encoding of `value`.
///
/// Every digest in the protocol goes through this helper so that encodings
/// for different purposes can never collide.
pub fn domain_digest<T: Serialize>(domain: &'static [u8], value: &T) -> [u8; 32] {
    let bytes = bincode::serialize(value).expect("protocol types always serialize");
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain);
    hasher.update(&bytes);
    *hasher.finalize().as_bytes()
}

macro_rules! hash_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            pub const fn from_hash(hash: [u8; 32]) -> Self {
                Self(hash)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn short_hex(&self) -> String {
                hex::encode(&self.0[..4])
            }

            pub fn from_hex(s: &str) -> Result<Self, TypeError> {
                let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
                if bytes.len() != 32 {
                    return Err(TypeError::InvalidLength { expected: 32, actual: bytes.len() });
                }
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&bytes);
                Ok(Self(arr))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "({})"), self.short_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }
    };
}

hash_id!(
    /// Identifies a chain: the digest of its canonical genesis document.
    /// Mixed into every signature digest to prevent cross-chain replay.
    ChainId,
    "ChainId"
);

hash_id!(
    /// Digest of a transaction's replay-protected payload (no signatures).
    TransactionId,
    "TransactionId"
);

/// Identifies a block.
///
/// The digest of the signed header, with the first four bytes replaced by the
/// big-endian block number: ids of consecutive blocks sort by height, and the
/// height is recoverable from the id alone.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub [u8; 32]);

impl BlockId {
    pub fn from_digest(mut digest: [u8; 32], block_num: u32) -> Self {
        digest[..4].copy_from_slice(&block_num.to_be_bytes());
        Self(digest)
    }

    /// The block height embedded in the id.
    pub fn block_num(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// The 32-bit word used as a transaction's TaPoS back-reference.
    pub fn tapos_prefix(&self) -> u32 {
        u32::from_le_bytes([self.0[4], self.0[5], self.0[6], self.0[7]])
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId(#{} {})", self.block_num(), self.short_hex())
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Store-assigned entity ids. Plain integers on the wire; the owning tables
/// in chain state give them meaning.
pub type DisciplineId = u64;
pub type ResearchId = u64;
pub type ResearchContentId = u64;
pub type ReviewId = u64;
pub type ResearchGroupId = u64;
pub type TokenSaleId = u64;
pub type ProposalId = u64;
pub type InviteId = u64;
