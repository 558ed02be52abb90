use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// 256-bit digest used for block signatures, miner hashes and transaction
/// content hashing throughout the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash256([u8; 32]);

impl Hash256 {
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Computes the SHA-256 digest of the provided data.
    #[must_use]
    pub fn sha256(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        Self(hash)
    }

    /// First `n` hex characters of the digest, used for anchors and tx ids.
    #[must_use]
    pub fn hex_prefix(&self, n: usize) -> String {
        let full = hex::encode(self.0);
        full[..n.min(full.len())].to_string()
    }

    /// Counts leading zero bits, big-endian.
    #[must_use]
    pub fn leading_zero_bits(&self) -> u32 {
        let mut zeros = 0;
        for &byte in &self.0 {
            if byte == 0 {
                zeros += 8;
            } else {
                zeros += byte.leading_zeros();
                break;
            }
        }
        zeros
    }

    /// The nibble (4 bits) immediately following `skip_bits` leading bits,
    /// interpreted as an integer in `[0, 15]`. Used by the difficulty bias
    /// check in `contrast_core::block`.
    #[must_use]
    pub fn nibble_after(&self, skip_bits: u32) -> u8 {
        let skip_bytes = (skip_bits / 8) as usize;
        let skip_rem = skip_bits % 8;
        if skip_bytes >= self.0.len() {
            return 0;
        }
        let window = u16::from_be_bytes([self.0[skip_bytes], *self.0.get(skip_bytes + 1).unwrap_or(&0)]);
        let shifted = window >> (12 - skip_rem);
        (shifted & 0x0F) as u8
    }

    #[must_use]
    pub const fn as_u256_be(&self) -> [u8; 32] {
        self.0
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl TryFrom<&str> for Hash256 {
    type Error = hex::FromHexError;

    fn try_from(hex_string: &str) -> Result<Self, Self::Error> {
        let bytes = hex::decode(hex_string)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes);
        Ok(Self(hash))
    }
}
