use std::fmt;

use ed25519_dalek::{Signer, Verifier};
use rand::rngs::OsRng;

use lyceum_types::{PublicKey, SignatureBytes};

use crate::error::CryptoError;

/// A block-producer or account signing key.
///
/// Wraps an ed25519 key pair. `Debug` never prints secret material.
#[derive(Clone)]
pub struct SigningKey {
    inner: ed25519_dalek::SigningKey,
}

impl SigningKey {
    /// Generates a fresh random key.
    pub fn generate() -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic key from 32 seed bytes. Test and genesis tooling only;
    /// real deployments generate keys.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(&seed),
        }
    }

    pub fn sign(&self, digest: &[u8; 32]) -> SignatureBytes {
        SignatureBytes(self.inner.sign(digest).to_bytes())
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey {
            inner: self.inner.verifying_key(),
        }
    }

    /// The wire form of this key's public half.
    pub fn public(&self) -> PublicKey {
        PublicKey(self.inner.verifying_key().to_bytes())
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKey({})", self.verifying_key())
    }
}

/// The public half of a signing key, validated as a curve point.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct VerifyingKey {
    inner: ed25519_dalek::VerifyingKey,
}

impl VerifyingKey {
    pub fn from_public(key: &PublicKey) -> Result<Self, CryptoError> {
        ed25519_dalek::VerifyingKey::from_bytes(key.as_bytes())
            .map(|inner| Self { inner })
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(self.inner.to_bytes())
    }

    pub fn verify(&self, digest: &[u8; 32], signature: &SignatureBytes) -> Result<(), CryptoError> {
        let sig = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
        self.inner
            .verify(digest, &sig)
            .map_err(|_| CryptoError::BadSignature)
    }
}

impl fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerifyingKey({})", self)
    }
}

impl fmt::Display for VerifyingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &hex::encode(self.inner.to_bytes())[..8])
    }
}

/// Checks `signature` over `digest` against the wire-form `key` in one step.
pub fn verify_signature(
    key: &PublicKey,
    digest: &[u8; 32],
    signature: &SignatureBytes,
) -> Result<(), CryptoError> {
    VerifyingKey::from_public(key)?.verify(digest, signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let key = SigningKey::from_seed([7; 32]);
        let digest = [42u8; 32];
        let sig = key.sign(&digest);
        assert!(verify_signature(&key.public(), &digest, &sig).is_ok());
    }

    #[test]
    fn wrong_digest_fails() {
        let key = SigningKey::from_seed([7; 32]);
        let sig = key.sign(&[1; 32]);
        assert_eq!(
            verify_signature(&key.public(), &[2; 32], &sig),
            Err(CryptoError::BadSignature)
        );
    }

    #[test]
    fn wrong_key_fails() {
        let signer = SigningKey::from_seed([7; 32]);
        let other = SigningKey::from_seed([8; 32]);
        let digest = [3u8; 32];
        let sig = signer.sign(&digest);
        assert_eq!(
            verify_signature(&other.public(), &digest, &sig),
            Err(CryptoError::BadSignature)
        );
    }

    #[test]
    fn seed_is_deterministic() {
        let a = SigningKey::from_seed([9; 32]);
        let b = SigningKey::from_seed([9; 32]);
        assert_eq!(a.public(), b.public());
    }

    #[test]
    fn generated_keys_differ() {
        assert_ne!(SigningKey::generate().public(), SigningKey::generate().public());
    }

    #[test]
    fn debug_output_contains_no_secret() {
        let seed = [5u8; 32];
        let key = SigningKey::from_seed(seed);
        let debug = format!("{key:?}");
        assert!(!debug.contains(&hex::encode(seed)));
    }

    #[test]
    fn garbage_public_key_is_rejected() {
        // Not a valid curve point.
        let bad = PublicKey([0xFF; 32]);
        assert!(VerifyingKey::from_public(&bad).is_err());
    }
}
