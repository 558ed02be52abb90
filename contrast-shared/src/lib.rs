pub mod crypto;
pub mod error;
pub mod hash;
pub mod types;

pub use crypto::{argon2id_digest, random_hex8, KeyPair, PrivateKey, PublicKey, Signature, SignatureAlgorithm};
pub use error::CryptoError;
pub use hash::Hash256;
