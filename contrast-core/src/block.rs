use crate::config::Settings;
use crate::transaction::Transaction;
use contrast_shared::crypto::argon2id_digest;
use contrast_shared::hash::Hash256;
use serde::{Deserialize, Serialize};

/// Block header. `nonce` is the header nonce; the coinbase nonce lives in
/// the coinbase transaction's sentinel input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub index: u64,
    /// Total supply before this block's coinbase is awarded.
    pub supply: u64,
    pub coin_base: u64,
    pub difficulty: u32,
    /// Rank of the producer among stakers for this block (0 = best).
    pub legitimacy: u32,
    pub prev_hash: Hash256,
    pub pos_timestamp: i64,
    pub timestamp: i64,
    pub hash: Hash256,
    pub nonce: String,
}

/// `{header, txs}`. By convention `txs[0]` is the PoS-reward transaction;
/// `txs[1]`, if present, is the coinbase. The two are identified by their
/// input shape, not by position, per the data model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockData {
    pub header: BlockHeader,
    pub txs: Vec<Transaction>,
}

impl BlockData {
    #[must_use]
    pub fn genesis(coin_base: u64, miner: &str) -> Self {
        let coinbase_tx = Transaction::coinbase("00000000".to_string(), coin_base, miner.to_string());
        let mut block = Self {
            header: BlockHeader {
                index: 0,
                supply: 0,
                coin_base,
                difficulty: 0,
                legitimacy: 0,
                prev_hash: Hash256::zero(),
                pos_timestamp: 0,
                timestamp: 0,
                hash: Hash256::zero(),
                nonce: "00000000".to_string(),
            },
            txs: vec![coinbase_tx],
        };
        block.header.hash = block_signature(&block, false);
        block
    }

    #[must_use]
    pub fn coinbase_tx(&self) -> Option<&Transaction> {
        self.txs.iter().find(|tx| tx.is_coinbase())
    }

    #[must_use]
    pub fn pos_tx(&self) -> Option<&Transaction> {
        self.txs.iter().find(|tx| tx.is_pos_reward())
    }

    #[must_use]
    pub fn coinbase_nonce(&self) -> String {
        self.coinbase_tx()
            .and_then(|tx| match tx.inputs.first() {
                Some(crate::types::TxInput::CoinbaseNonce(n)) => Some(n.clone()),
                _ => None,
            })
            .unwrap_or_else(|| "00000000".to_string())
    }

    #[must_use]
    pub fn size(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn exceeds_max_size(&self, settings: &Settings) -> bool {
        self.size() > settings.max_block_size
    }
}

/// SHA-256 of the concatenation of the ids of the given transactions, in
/// order.
#[must_use]
pub fn txs_hash(txs: &[&Transaction]) -> Hash256 {
    let concatenated: String = txs.iter().map(|tx| tx.id.as_str()).collect();
    Hash256::sha256(concatenated.as_bytes())
}

/// `blockSignature(block, isPosHash)`. Excludes the coinbase transaction
/// always; when `is_pos_hash` is set, also excludes the PoS-reward
/// transaction and omits `timestamp` from the signed message.
#[must_use]
pub fn block_signature(block: &BlockData, is_pos_hash: bool) -> Hash256 {
    let included: Vec<&Transaction> = block
        .txs
        .iter()
        .filter(|tx| !tx.is_coinbase() && !(is_pos_hash && tx.is_pos_reward()))
        .collect();
    let digest = txs_hash(&included);

    let h = &block.header;
    let mut message = format!(
        "{}{}{}{}{}{}{}{}",
        h.index, h.supply, h.coin_base, h.difficulty, h.legitimacy, h.prev_hash, h.pos_timestamp, digest
    );
    if !is_pos_hash {
        message.push_str(&h.timestamp.to_string());
    }
    Hash256::sha256(message.as_bytes())
}

/// `minerHash(block, useDevArgon2)`: `Argon2id(blockSignature, headerNonce || coinbaseNonce)`.
#[must_use]
pub fn miner_hash(block: &BlockData, use_dev_argon2: bool) -> Hash256 {
    let signature = block_signature(block, false);
    let nonce_material = format!("{}{}", block.header.nonce, block.coinbase_nonce());
    let digest = argon2id_digest(signature.as_bytes(), nonce_material.as_bytes(), use_dev_argon2);
    Hash256::from_bytes(digest)
}

/// Difficulty predicate over a 256-bit hash, interpreted big-endian:
/// `Z = difficulty / 16` leading zero bits are required, and the nibble
/// immediately following must be `>= A = difficulty % 16`.
#[must_use]
pub fn meets_difficulty(hash: &Hash256, difficulty: u32) -> bool {
    let z = difficulty / 16;
    let a = difficulty % 16;
    if hash.leading_zero_bits() < z {
        return false;
    }
    u32::from(hash.nibble_after(z)) >= a
}

/// `calculateNextCoinbaseReward(prevBlock)`: halvings based on the next
/// index, floored at `MIN_BLOCK_REWARD`, capped so supply never exceeds
/// `MAX_SUPPLY`. Supply accounting follows the resolved Open Question:
/// `newSupply = prev.supply + prev.coinBase` consistently.
#[must_use]
pub fn calculate_next_coinbase_reward(prev: &BlockData, settings: &Settings) -> u64 {
    let next_index = prev.header.index + 1;
    let halvings = next_index / settings.halving_interval;
    let halved = settings.block_reward.checked_shr(halvings as u32).unwrap_or(0);
    let reward = halved.max(settings.min_block_reward);
    let current_supply = prev.header.supply + prev.header.coin_base;
    reward.min(settings.max_supply.saturating_sub(current_supply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rule;

    #[test]
    fn genesis_hash_is_nonzero_and_stable() {
        let genesis = BlockData::genesis(5000, "miner-a");
        assert_ne!(genesis.header.hash, Hash256::zero());
        assert_eq!(genesis.header.index, 0);
        assert!(genesis.coinbase_tx().is_some());
    }

    #[test]
    fn meets_difficulty_zero_always_conforms() {
        let hash = Hash256::sha256(b"anything");
        assert!(meets_difficulty(&hash, 0));
    }

    #[test]
    fn meets_difficulty_respects_leading_zero_requirement() {
        let easy = Hash256::from_bytes([0u8; 32]);
        assert!(meets_difficulty(&easy, 255));
        let hard = Hash256::from_bytes({
            let mut b = [0xFFu8; 32];
            b[0] = 0xFF;
            b
        });
        assert!(!meets_difficulty(&hard, 16));
    }

    #[test]
    fn next_coinbase_reward_halves_at_interval_and_floors() {
        let mut settings = Settings::default();
        settings.halving_interval = 10;
        settings.block_reward = 100;
        settings.min_block_reward = 1;
        settings.max_supply = u64::MAX;

        let mut prev = BlockData::genesis(100, "m");
        prev.header.index = 9; // next index = 10 -> one halving
        assert_eq!(calculate_next_coinbase_reward(&prev, &settings), 50);

        prev.header.index = 19; // next index = 20 -> two halvings
        assert_eq!(calculate_next_coinbase_reward(&prev, &settings), 25);
    }

    #[test]
    fn next_coinbase_reward_never_exceeds_remaining_supply() {
        let mut settings = Settings::default();
        settings.max_supply = 150;
        settings.block_reward = 100;
        settings.min_block_reward = 1;
        settings.halving_interval = 1_000_000;

        let mut prev = BlockData::genesis(100, "m");
        prev.header.supply = 0;
        prev.header.coin_base = 100;
        assert_eq!(calculate_next_coinbase_reward(&prev, &settings), 50);
    }

    #[test]
    fn output_rule_variants_round_trip_through_serde() {
        let rule = Rule::LockUntilBlock(42);
        let json = serde_json::to_string(&rule).unwrap();
        let back: Rule = serde_json::from_str(&json).unwrap();
        assert_eq!(rule, back);
    }
}
