//! Minimal aliases shared by both `contrast-core` and the node binary.

/// Opaque short address string, derived from a public key via Argon2id
/// (see `crypto::PublicKey::derive_address`).
pub type Address = String;

/// Monetary amount in micro-units.
pub type Amount = u64;

/// Unix millisecond timestamp.
pub type Timestamp = i64;

/// Block height.
pub type BlockHeight = u64;

/// Output index within a transaction.
pub type OutputIndex = u32;
