use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid public key bytes")]
    InvalidPublicKey,

    #[error("signature verification failed")]
    BadSignature,

    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),
}
