use crate::types::{Address, Amount, Anchor, Rule, TxInput};
use contrast_shared::hash::Hash256;
use serde::{Deserialize, Serialize};

/// Output of a transaction: an amount, an owning address, and the rule
/// under which it can be spent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxOutput {
    pub amount: Amount,
    pub address: Address,
    pub rule: Rule,
}

impl TxOutput {
    #[must_use]
    pub const fn new(amount: Amount, address: Address, rule: Rule) -> Self {
        Self { amount, address, rule }
    }
}

/// An unspent output, carrying the anchor assigned to it at digest time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utxo {
    pub anchor: Anchor,
    pub output: TxOutput,
}

/// Canonical encoding used for id hashing: exactly `(inputs, outputs, version)`.
#[derive(Serialize)]
struct CanonicalTx<'a> {
    inputs: &'a [TxInput],
    outputs: &'a [TxOutput],
    version: u32,
}

/// A transaction. `witnesses[i]` is expected to authorize `inputs[i]` for
/// non-sentinel inputs, rendered as `sigHex:pubKeyHex`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub witnesses: Vec<String>,

    /// Mempool-only: fee divided by `byte_weight`, rounded to 6 decimals.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fee_per_byte: Option<f64>,
    /// Mempool-only: serialized size in bytes.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub byte_weight: Option<u32>,
}

impl Transaction {
    /// Builds a transaction and computes its id from the canonical
    /// encoding of `(inputs, outputs, version)`.
    #[must_use]
    pub fn new(version: u32, inputs: Vec<TxInput>, outputs: Vec<TxOutput>, witnesses: Vec<String>) -> Self {
        let id = Self::compute_id(&inputs, &outputs, version);
        Self { id, version, inputs, outputs, witnesses, fee_per_byte: None, byte_weight: None }
    }

    #[must_use]
    pub fn compute_id(inputs: &[TxInput], outputs: &[TxOutput], version: u32) -> String {
        let canonical = CanonicalTx { inputs, outputs, version };
        let bytes = serde_json::to_vec(&canonical).expect("canonical tx encoding never fails");
        Hash256::sha256(&bytes).hex_prefix(8)
    }

    /// A coinbase transaction pays a single output from an 8-hex nonce
    /// sentinel input.
    #[must_use]
    pub fn coinbase(nonce: String, reward: Amount, miner: Address) -> Self {
        Self::new(1, vec![TxInput::CoinbaseNonce(nonce)], vec![TxOutput::new(reward, miner, Rule::Sig)], vec![])
    }

    /// A PoS-reward transaction pays its single output from a staked
    /// address + PoS hash sentinel input.
    #[must_use]
    pub fn pos_reward(staked_address: Address, pos_hash: String, reward: Amount, recipient: Address) -> Self {
        Self::new(
            1,
            vec![TxInput::PosRef { staked_address, pos_hash }],
            vec![TxOutput::new(reward, recipient, Rule::Sig)],
            vec![],
        )
    }

    #[must_use]
    pub fn is_coinbase(&self) -> bool {
        matches!(self.inputs.first(), Some(TxInput::CoinbaseNonce(_)))
    }

    #[must_use]
    pub fn is_pos_reward(&self) -> bool {
        matches!(self.inputs.first(), Some(TxInput::PosRef { .. }))
    }

    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.is_coinbase() || self.is_pos_reward()
    }

    #[must_use]
    pub fn total_output_value(&self) -> Amount {
        self.outputs.iter().map(|o| o.amount).sum()
    }

    #[must_use]
    pub fn id_prefix8(&self) -> &str {
        &self.id
    }

    /// Serialized size in bytes, used to compute `byte_weight`/`feePerByte`.
    #[must_use]
    pub fn estimated_size(&self) -> u32 {
        serde_json::to_vec(self).map(|v| v.len() as u32).unwrap_or(0)
    }

    /// Populates the mempool-only `fee_per_byte`/`byte_weight` fields.
    pub fn with_fee(mut self, fee: Amount) -> Self {
        let weight = self.estimated_size().max(1);
        self.byte_weight = Some(weight);
        self.fee_per_byte = Some(round6(fee as f64 / weight as f64));
        self
    }
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}
