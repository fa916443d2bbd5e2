//! Cryptographic primitives for the Lyceum research chain.
//!
//! - [`SigningKey`] / [`VerifyingKey`] -- ed25519 key newtypes with redacted
//!   debug output, converting to and from the wire-form
//!   [`lyceum_types::PublicKey`]
//! - [`verify_signature`] -- one-step wire-form verification
//! - [`merkle_root`] -- binary Merkle root over transaction digests

pub mod error;
pub mod merkle;
pub mod signer;

pub use error::CryptoError;
pub use merkle::merkle_root;
pub use signer::{verify_signature, SigningKey, VerifyingKey};
