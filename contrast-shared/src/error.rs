use thiserror::Error;

/// Low-level failures from the crypto/hash primitives. The core wraps
/// these into its own `ContrastError::Malformed` variant rather than
/// exposing them directly across the crate boundary.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid key size: expected {expected}, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid hex/encoding: {0}")]
    InvalidEncoding(String),
}
