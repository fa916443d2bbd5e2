use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::account::AccountName;
use crate::error::TypeError;

/// Wire form of an ed25519 public key. `lyceum-crypto` converts to and from
/// its checked `VerifyingKey`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &self.to_hex()[..8])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Which of an account's three authority tiers an operation requires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthorityKind {
    Owner,
    Active,
    Posting,
}

/// A weighted-threshold authority: satisfied when the weights of present
/// signer keys, plus the weights of satisfied delegated accounts, reach the
/// threshold.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
    pub weight_threshold: u32,
    pub account_auths: BTreeMap<AccountName, u16>,
    pub key_auths: BTreeMap<PublicKey, u16>,
}

/// Delegated-authority recursion bound; guards against cycles and blow-up.
pub const MAX_AUTHORITY_DEPTH: u32 = 2;

impl Authority {
    /// Single-key authority with threshold 1. The usual account shape.
    pub fn single_key(key: PublicKey) -> Self {
        let mut key_auths = BTreeMap::new();
        key_auths.insert(key, 1);
        Self {
            weight_threshold: 1,
            account_auths: BTreeMap::new(),
            key_auths,
        }
    }

    pub fn is_impossible(&self) -> bool {
        let total: u64 = self
            .account_auths
            .values()
            .chain(self.key_auths.values())
            .map(|w| u64::from(*w))
            .sum();
        total < u64::from(self.weight_threshold)
    }

    pub fn validate(&self) -> Result<(), TypeError> {
        if self.weight_threshold == 0 {
            return Err(TypeError::MalformedAuthority(
                "zero weight threshold".to_string(),
            ));
        }
        if self.account_auths.is_empty() && self.key_auths.is_empty() {
            return Err(TypeError::MalformedAuthority("empty authority".to_string()));
        }
        if self.is_impossible() {
            return Err(TypeError::MalformedAuthority(
                "threshold unreachable with listed weights".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `signers` satisfies this authority, resolving delegated
    /// account authorities through `resolve` down to `MAX_AUTHORITY_DEPTH`.
    pub fn is_satisfied_by(
        &self,
        signers: &BTreeSet<PublicKey>,
        resolve: &mut dyn FnMut(&str) -> Option<Authority>,
    ) -> bool {
        self.satisfied_at_depth(signers, resolve, 0)
    }

    fn satisfied_at_depth(
        &self,
        signers: &BTreeSet<PublicKey>,
        resolve: &mut dyn FnMut(&str) -> Option<Authority>,
        depth: u32,
    ) -> bool {
        let mut weight: u64 = 0;
        let threshold = u64::from(self.weight_threshold);

        for (key, w) in &self.key_auths {
            if signers.contains(key) {
                weight += u64::from(*w);
                if weight >= threshold {
                    return true;
                }
            }
        }

        if depth >= MAX_AUTHORITY_DEPTH {
            return weight >= threshold;
        }

        for (account, w) in &self.account_auths {
            if let Some(delegated) = resolve(account) {
                if delegated.satisfied_at_depth(signers, resolve, depth + 1) {
                    weight += u64::from(*w);
                    if weight >= threshold {
                        return true;
                    }
                }
            }
        }

        weight >= threshold
    }
}
