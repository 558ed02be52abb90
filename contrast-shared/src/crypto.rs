//! Cryptographic primitives consumed by the core: Ed25519-like signing,
//! SHA-256 content hashing (see `hash.rs`) and Argon2id used for the miner
//! hash and for address derivation.

use crate::error::CryptoError;
use argon2::{Algorithm, Argon2, Params, Version};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

pub type Result<T> = std::result::Result<T, CryptoError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    Ed25519,
}

/// Public key, hex-renderable, used both for verifying witnesses and for
/// deriving an owner address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    key_data: [u8; 32],
}

/// Private signing key. Zeroized on drop.
#[derive(Debug, Clone)]
pub struct PrivateKey {
    key_data: [u8; 32],
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    data: Vec<u8>,
    public_key: PublicKey,
    algorithm: SignatureAlgorithm,
    timestamp: DateTime<Utc>,
}

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key_data: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeySize { expected: 32, actual: bytes.len() })?;
        Ok(Self { key_data })
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.key_data
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.key_data)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    fn to_verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.key_data).map_err(|_| CryptoError::InvalidSignature)
    }

    /// Derives the opaque short address owned by this public key, via
    /// Argon2id over the raw key bytes. `use_dev_hash` selects a
    /// low-cost parameter set for local/dev networks.
    #[must_use]
    pub fn derive_address(&self, use_dev_hash: bool) -> String {
        let digest = argon2id_digest(&self.key_data, b"contrast-address", use_dev_hash);
        hex::encode(digest)[..40].to_string()
    }
}

impl PrivateKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key_data: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeySize { expected: 32, actual: bytes.len() })?;
        Ok(Self { key_data })
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.key_data
    }

    fn to_signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.key_data)
    }
}

impl KeyPair {
    pub fn generate() -> Result<Self> {
        let signing_key = SigningKey::generate(&mut OsRng);
        let private_key = PrivateKey { key_data: signing_key.to_bytes() };
        let public_key = PublicKey { key_data: signing_key.verifying_key().to_bytes() };
        Ok(Self { public_key, private_key })
    }

    pub fn sign(&self, message: &[u8]) -> Result<Signature> {
        let signing_key = self.private_key.to_signing_key();
        let signature = signing_key.sign(message);
        Ok(Signature {
            data: signature.to_bytes().to_vec(),
            public_key: self.public_key.clone(),
            algorithm: SignatureAlgorithm::Ed25519,
            timestamp: Utc::now(),
        })
    }
}

impl Signature {
    pub fn verify(&self, message: &[u8]) -> Result<bool> {
        let verifying_key = self.public_key.to_verifying_key()?;
        let sig_bytes: [u8; 64] = self
            .data
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidSignature)?;
        let signature = DalekSignature::from_bytes(&sig_bytes);
        Ok(verifying_key.verify(message, &signature).is_ok())
    }

    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.data)
    }

    /// Parses the `sigHex:pubKeyHex` witness encoding used by §3 of the
    /// transaction model.
    pub fn from_witness(witness: &str) -> Result<Self> {
        let (sig_hex, pk_hex) = witness
            .split_once(':')
            .ok_or_else(|| CryptoError::InvalidEncoding("missing ':' in witness".into()))?;
        let data = hex::decode(sig_hex).map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
        let public_key = PublicKey::from_hex(pk_hex)?;
        Ok(Self { data, public_key, algorithm: SignatureAlgorithm::Ed25519, timestamp: Utc::now() })
    }

    #[must_use]
    pub fn to_witness(&self) -> String {
        format!("{}:{}", self.to_hex(), self.public_key.to_hex())
    }
}

impl Zeroize for PrivateKey {
    fn zeroize(&mut self) {
        self.key_data.zeroize();
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

/// Argon2id digest over `data`, salted with `context`. `use_dev_hash` uses
/// reduced memory/time cost, for fast local test networks; production
/// networks must run with `false`.
#[must_use]
pub fn argon2id_digest(data: &[u8], context: &[u8], use_dev_hash: bool) -> [u8; 32] {
    let params = if use_dev_hash {
        Params::new(8, 1, 1, Some(32)).expect("valid dev argon2 params")
    } else {
        Params::new(19 * 1024, 2, 1, Some(32)).expect("valid argon2 params")
    };
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let salt = derive_salt(context);
    let mut out = [0u8; 32];
    argon2
        .hash_password_into(data, &salt, &mut out)
        .expect("argon2id hashing never fails for fixed-size output");
    out
}

fn derive_salt(context: &[u8]) -> [u8; 16] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(context);
    let out = hasher.finalize();
    let mut salt = [0u8; 16];
    salt.copy_from_slice(&out[..16]);
    salt
}

/// Generates a random 8-hex-char nonce, used for coinbase inputs and
/// header/coinbase nonce fields during mining.
#[must_use]
pub fn random_hex8() -> String {
    let mut bytes = [0u8; 4];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let keypair = KeyPair::generate().unwrap();
        let message = b"contrast transaction id";
        let signature = keypair.sign(message).unwrap();
        assert!(signature.verify(message).unwrap());
        assert!(!signature.verify(b"tampered").unwrap());
    }

    #[test]
    fn witness_roundtrip() {
        let keypair = KeyPair::generate().unwrap();
        let signature = keypair.sign(b"msg").unwrap();
        let witness = signature.to_witness();
        let parsed = Signature::from_witness(&witness).unwrap();
        assert!(parsed.verify(b"msg").unwrap());
    }

    #[test]
    fn argon2id_is_deterministic_for_same_inputs() {
        let a = argon2id_digest(b"data", b"ctx", true);
        let b = argon2id_digest(b"data", b"ctx", true);
        assert_eq!(a, b);
    }

    #[test]
    fn derive_address_is_stable_and_short() {
        let keypair = KeyPair::generate().unwrap();
        let addr1 = keypair.public_key.derive_address(true);
        let addr2 = keypair.public_key.derive_address(true);
        assert_eq!(addr1, addr2);
        assert_eq!(addr1.len(), 40);
    }
}
