use std::fmt;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::authority::PublicKey;
use crate::error::TypeError;
use crate::ids::{domain_digest, BlockId, ChainId, TransactionId};
use crate::operations::Operation;
use crate::time::ChainTime;

pub const MAX_TRANSACTION_SIZE: usize = 1024 * 64;

const TX_DOMAIN: &[u8] = b"lyceum-tx-v1:";
const SIG_DOMAIN: &[u8] = b"lyceum-sig-v1:";

/// A raw 64-byte ed25519 signature, hex on the wire. `lyceum-crypto` owns
/// verification.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SignatureBytes(pub [u8; 64]);

impl SignatureBytes {
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 64 {
            return Err(TypeError::InvalidLength {
                expected: 64,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 64];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl Default for SignatureBytes {
    fn default() -> Self {
        SignatureBytes([0; 64])
    }
}

impl fmt::Debug for SignatureBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureBytes({}..)", &self.to_hex()[..8])
    }
}

impl Serialize for SignatureBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SignatureBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        SignatureBytes::from_hex(&s).map_err(D::Error::custom)
    }
}

/// One signer's contribution to a transaction: the key it claims and the
/// signature over the chain-scoped digest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSignature {
    pub signer: PublicKey,
    pub signature: SignatureBytes,
}

/// The replay-protected transaction payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Low 16 bits of the referenced block's height (TaPoS).
    pub ref_block_num: u16,
    /// Prefix word of the referenced block's id (TaPoS).
    pub ref_block_prefix: u32,
    pub expiration: ChainTime,
    pub operations: Vec<Operation>,
}

impl Transaction {
    /// Digest of the payload; the transaction's identity.
    pub fn digest(&self) -> [u8; 32] {
        domain_digest(TX_DOMAIN, self)
    }

    pub fn id(&self) -> TransactionId {
        TransactionId::from_hash(self.digest())
    }

    /// The digest signatures commit to: chain id mixed with the payload
    /// digest, so a signature can never be replayed across chains.
    pub fn sig_digest(&self, chain_id: &ChainId) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(SIG_DOMAIN);
        hasher.update(chain_id.as_bytes());
        hasher.update(&self.digest());
        *hasher.finalize().as_bytes()
    }

    /// Points the TaPoS reference at `block_id`.
    pub fn set_reference_block(&mut self, block_id: &BlockId) {
        self.ref_block_num = (block_id.block_num() & 0xffff) as u16;
        self.ref_block_prefix = block_id.tapos_prefix();
    }

    pub fn validate(&self) -> Result<(), TypeError> {
        if self.operations.is_empty() {
            return Err(TypeError::InvalidOperation(
                "transaction carries no operations".to_string(),
            ));
        }
        for op in &self.operations {
            op.validate()?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub signatures: Vec<TransactionSignature>,
}

impl SignedTransaction {
    pub fn id(&self) -> TransactionId {
        self.transaction.id()
    }

    /// Serialized size in bytes, as counted against the block size budget.
    pub fn encoded_size(&self) -> usize {
        bincode::serialized_size(self).expect("transactions always serialize") as usize
    }

    pub fn validate(&self) -> Result<(), TypeError> {
        self.transaction.validate()?;
        if self.encoded_size() > MAX_TRANSACTION_SIZE {
            return Err(TypeError::InvalidOperation(
                "transaction exceeds maximum size".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Tokens;
    use crate::operations::Transfer;

    fn simple_tx() -> Transaction {
        Transaction {
            ref_block_num: 0,
            ref_block_prefix: 0,
            expiration: ChainTime::from_secs(1000),
            operations: vec![Operation::Transfer(Transfer {
                from: "alice".into(),
                to: "bobby".into(),
                amount: Tokens::new(5),
                memo: String::new(),
            })],
        }
    }

    #[test]
    fn id_is_deterministic_and_signature_free() {
        let tx = simple_tx();
        assert_eq!(tx.id(), tx.id());

        let signed = SignedTransaction {
            transaction: tx.clone(),
            signatures: vec![TransactionSignature {
                signer: PublicKey([1; 32]),
                signature: SignatureBytes([2; 64]),
            }],
        };
        assert_eq!(signed.id(), tx.id());
    }

    #[test]
    fn id_changes_with_payload() {
        let a = simple_tx();
        let mut b = simple_tx();
        b.expiration = ChainTime::from_secs(2000);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn sig_digest_binds_chain_id() {
        let tx = simple_tx();
        let chain_a = ChainId::from_hash([1; 32]);
        let chain_b = ChainId::from_hash([2; 32]);
        assert_ne!(tx.sig_digest(&chain_a), tx.sig_digest(&chain_b));
    }

    #[test]
    fn reference_block_sets_tapos_fields() {
        let mut digest = [0u8; 32];
        digest[4..8].copy_from_slice(&77u32.to_le_bytes());
        let block_id = BlockId::from_digest(digest, 0x0001_0042);

        let mut tx = simple_tx();
        tx.set_reference_block(&block_id);
        assert_eq!(tx.ref_block_num, 0x0042);
        assert_eq!(tx.ref_block_prefix, 77);
    }

    #[test]
    fn empty_transaction_is_invalid() {
        let tx = Transaction::default();
        assert!(tx.validate().is_err());
    }

    #[test]
    fn signature_bytes_hex_roundtrip() {
        let sig = SignatureBytes([9; 64]);
        let json = serde_json::to_string(&sig).unwrap();
        let parsed: SignatureBytes = serde_json::from_str(&json).unwrap();
        assert_eq!(sig, parsed);
    }
}
