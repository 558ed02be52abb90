//! Core data model types shared across validation, the UTXO cache, the
//! mempool and the block tree: anchors, output rules and the tagged
//! `TxInput` variant.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use contrast_shared::types::{Address, Amount, BlockHeight, OutputIndex, Timestamp};

/// Stable identifier of a created UTXO: `<blockHeight>:<txIdPrefix8>:<outputIndex>`.
/// Globally unique once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Anchor {
    pub height: BlockHeight,
    pub tx_id_prefix: String,
    pub output_index: OutputIndex,
}

impl Anchor {
    #[must_use]
    pub fn new(height: BlockHeight, tx_id_prefix: impl Into<String>, output_index: OutputIndex) -> Self {
        Self { height, tx_id_prefix: tx_id_prefix.into(), output_index }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.height, self.tx_id_prefix, self.output_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorParseError(pub String);

impl fmt::Display for AnchorParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid anchor: {}", self.0)
    }
}

impl FromStr for Anchor {
    type Err = AnchorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let height = parts
            .next()
            .ok_or_else(|| AnchorParseError(s.to_string()))?
            .parse::<BlockHeight>()
            .map_err(|_| AnchorParseError(s.to_string()))?;
        let tx_id_prefix = parts.next().ok_or_else(|| AnchorParseError(s.to_string()))?;
        if tx_id_prefix.len() != 8 || !tx_id_prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AnchorParseError(s.to_string()));
        }
        let output_index = parts
            .next()
            .ok_or_else(|| AnchorParseError(s.to_string()))?
            .parse::<OutputIndex>()
            .map_err(|_| AnchorParseError(s.to_string()))?;
        if parts.next().is_some() {
            return Err(AnchorParseError(s.to_string()));
        }
        Ok(Self { height, tx_id_prefix: tx_id_prefix.to_string(), output_index })
    }
}

/// Output spending rule. Intentionally a small fixed enum rather than a
/// scripting surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rule {
    /// Spendable with a single valid signature from the owning address.
    Sig,
    /// Stake commitment: spendable by signature, or slashable by the
    /// protocol (consumption path not implemented; see VSS §9).
    SigOrSlash,
    /// Not spendable until `LockUntilBlock(height)` has been reached.
    LockUntilBlock(BlockHeight),
    /// Creates a multi-signature group (scaffolding only).
    MultiSigCreate,
    /// Peer-to-peer exchange escrow rule (scaffolding only).
    P2PExchange,
}

/// Heterogeneous transaction input, modeled as an explicit tagged variant
/// rather than dispatched by string shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxInput {
    /// References a currently-unspent output by anchor.
    Anchor(Anchor),
    /// Coinbase sentinel: an 8-hex-char nonce.
    CoinbaseNonce(String),
    /// PoS-reward sentinel: the staked address and a 64-hex-char PoS hash.
    PosRef { staked_address: Address, pos_hash: String },
}

impl TxInput {
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        !matches!(self, TxInput::Anchor(_))
    }

    #[must_use]
    pub fn as_anchor(&self) -> Option<&Anchor> {
        match self {
            TxInput::Anchor(a) => Some(a),
            _ => None,
        }
    }
}

impl fmt::Display for TxInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxInput::Anchor(a) => write!(f, "{a}"),
            TxInput::CoinbaseNonce(n) => write!(f, "{n}"),
            TxInput::PosRef { staked_address, pos_hash } => write!(f, "{staked_address}:{pos_hash}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_display_and_parse_roundtrip() {
        let anchor = Anchor::new(42, "deadbeef", 1);
        let rendered = anchor.to_string();
        assert_eq!(rendered, "42:deadbeef:1");
        let parsed: Anchor = rendered.parse().unwrap();
        assert_eq!(parsed, anchor);
    }

    #[test]
    fn anchor_parse_rejects_bad_prefix_length() {
        assert!("42:dead:1".parse::<Anchor>().is_err());
    }

    #[test]
    fn tx_input_sentinel_classification() {
        assert!(!TxInput::Anchor(Anchor::new(0, "deadbeef", 0)).is_sentinel());
        assert!(TxInput::CoinbaseNonce("cafebabe".into()).is_sentinel());
        assert!(TxInput::PosRef { staked_address: "addr".into(), pos_hash: "0".repeat(64) }.is_sentinel());
    }
}
