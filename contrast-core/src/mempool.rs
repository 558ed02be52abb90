//! Mempool (C6): transaction admission, fee-per-byte ordering and
//! collision detection. Dual-indexed the way a fee-priority pool usually
//! is: a `HashMap` for O(1) lookup/duplicate detection and an ordered
//! structure (here a `BTreeMap` bucketed by integer fee-per-byte) for
//! fee-ordered batch selection.

use crate::block::BlockData;
use crate::config::Settings;
use crate::error::{ContrastError, Result};
use crate::transaction::Transaction;
use crate::types::{Address, Anchor, TxInput};
use crate::utxo::UtxoCache;
use crate::validation;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Scales a `feePerByte` (already rounded to 6 decimals) into an integer
/// bucket key so it can live in an ordered `BTreeMap`.
fn fee_bucket(fee_per_byte: f64) -> u64 {
    (fee_per_byte * 1_000_000.0).round() as u64
}

#[derive(Debug, Default)]
pub struct Mempool {
    txs_by_id: HashMap<String, Transaction>,
    txs_by_fee_per_byte: BTreeMap<u64, Vec<String>>,
    tx_by_anchor: HashMap<Anchor, String>,
    known_pubkeys: HashMap<String, Address>,
    known_pubkeys_order: VecDeque<String>,
}

impl Mempool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.txs_by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.txs_by_id.is_empty()
    }

    #[must_use]
    pub fn contains(&self, tx_id: &str) -> bool {
        self.txs_by_id.contains_key(tx_id)
    }

    #[must_use]
    pub fn get(&self, tx_id: &str) -> Option<&Transaction> {
        self.txs_by_id.get(tx_id)
    }

    fn anchor_inputs(tx: &Transaction) -> impl Iterator<Item = &Anchor> {
        tx.inputs.iter().filter_map(TxInput::as_anchor)
    }

    fn collides(&self, tx: &Transaction) -> bool {
        if self.txs_by_id.contains_key(&tx.id) {
            return true;
        }
        Self::anchor_inputs(tx).any(|a| self.tx_by_anchor.contains_key(a))
    }

    fn remember_pubkey(&mut self, pubkey_hex: String, address: Address, settings: &Settings) {
        if !self.known_pubkeys.contains_key(&pubkey_hex) {
            self.known_pubkeys_order.push_back(pubkey_hex.clone());
        }
        self.known_pubkeys.insert(pubkey_hex, address);

        let cap = settings.max_known_pubkeys;
        let trim_at = cap + cap / 10;
        if self.known_pubkeys_order.len() > trim_at {
            while self.known_pubkeys_order.len() > cap {
                if let Some(oldest) = self.known_pubkeys_order.pop_front() {
                    self.known_pubkeys.remove(&oldest);
                }
            }
        }
    }

    /// `pushTransaction`: well-formedness, collision rejection, fee/rule
    /// validation, witness and ownership checks, then insertion into all
    /// three indices.
    pub fn push_transaction(&mut self, cache: &UtxoCache, mut tx: Transaction, settings: &Settings) -> Result<()> {
        validation::is_well_formed_transaction(cache, &tx, false, settings)?;

        if self.collides(&tx) {
            return Err(ContrastError::Conflicting(format!("tx {} conflicts with mempool", tx.id)));
        }

        let fee = validation::remaining_amount(cache, &tx)?;
        let byte_weight = tx.estimated_size().max(1);
        let fee_per_byte = (fee as f64 / f64::from(byte_weight) * 1_000_000.0).round() / 1_000_000.0;
        if fee_per_byte < settings.min_fee_per_byte {
            return Err(ContrastError::InsufficientFunds(format!(
                "tx {}: feePerByte {fee_per_byte} below minimum {}",
                tx.id, settings.min_fee_per_byte
            )));
        }
        tx.fee_per_byte = Some(fee_per_byte);
        tx.byte_weight = Some(byte_weight);

        validation::control_tx_output_rules(&tx, fee)?;
        validation::control_all_witnesses(&tx)?;
        validation::address_ownership_confirmation(cache, &tx, &mut self.known_pubkeys, settings.use_dev_hash)?;
        for witness in &tx.witnesses {
            if let Ok(sig) = contrast_shared::crypto::Signature::from_witness(witness) {
                let pk_hex = sig.public_key().to_hex();
                if let Some(addr) = self.known_pubkeys.get(&pk_hex).cloned() {
                    self.remember_pubkey(pk_hex, addr, settings);
                }
            }
        }

        for anchor in Self::anchor_inputs(&tx) {
            self.tx_by_anchor.insert(anchor.clone(), tx.id.clone());
        }
        self.txs_by_fee_per_byte.entry(fee_bucket(fee_per_byte)).or_default().push(tx.id.clone());
        self.txs_by_id.insert(tx.id.clone(), tx);
        Ok(())
    }

    /// Purges any mempool transaction whose input anchor no longer
    /// resolves against `cache` (spent by a different transaction).
    pub fn clear_transactions_who_utxos_are_spent(&mut self, cache: &UtxoCache) {
        let stale: Vec<String> = self
            .txs_by_id
            .values()
            .filter(|tx| Self::anchor_inputs(tx).any(|a| cache.get_by_anchor(a).is_none()))
            .map(|tx| tx.id.clone())
            .collect();
        for id in stale {
            self.remove(&id);
        }
    }

    /// For each non-sentinel transaction across `blocks`, drop any
    /// mempool transaction colliding by input anchor.
    pub fn digest_finalized_blocks_transactions(&mut self, blocks: &[BlockData]) {
        for block in blocks {
            for tx in &block.txs {
                if tx.is_sentinel() {
                    continue;
                }
                for input in &tx.inputs {
                    if let TxInput::Anchor(anchor) = input {
                        if let Some(id) = self.tx_by_anchor.get(anchor).cloned() {
                            self.remove(&id);
                        }
                    }
                }
                self.remove(&tx.id);
            }
        }
    }

    fn remove(&mut self, tx_id: &str) -> Option<Transaction> {
        let tx = self.txs_by_id.remove(tx_id)?;
        for anchor in Self::anchor_inputs(&tx) {
            self.tx_by_anchor.remove(anchor);
        }
        if let Some(bucket) = tx.fee_per_byte.map(fee_bucket) {
            if let Some(list) = self.txs_by_fee_per_byte.get_mut(&bucket) {
                list.retain(|id| id != tx_id);
                if list.is_empty() {
                    self.txs_by_fee_per_byte.remove(&bucket);
                }
            }
        }
        Some(tx)
    }

    /// Packs transactions from the highest fee bucket down until 98% of
    /// `max_block_size` would be consumed.
    #[must_use]
    pub fn get_most_lucrative_transactions_batch(&self, settings: &Settings) -> Vec<Transaction> {
        let budget = (settings.max_block_size as f64 * 0.98) as usize;
        let mut batch = Vec::new();
        let mut used = 0usize;

        for ids in self.txs_by_fee_per_byte.values().rev() {
            for id in ids {
                let Some(tx) = self.txs_by_id.get(id) else { continue };
                let weight = tx.byte_weight.unwrap_or_else(|| tx.estimated_size()) as usize;
                if used + weight > budget {
                    return batch;
                }
                used += weight;
                batch.push(tx.clone());
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockHeader;
    use crate::transaction::TxOutput;
    use crate::types::Rule;
    use contrast_shared::crypto::KeyPair;
    use contrast_shared::hash::Hash256;

    fn settings() -> Settings {
        let mut s = Settings::default();
        s.min_fee_per_byte = 0.0;
        s.use_dev_hash = true;
        s
    }

    fn funded_cache(address: &str, amount: u64) -> (UtxoCache, Anchor) {
        let mut cache = UtxoCache::new();
        let genesis = Transaction::coinbase("deadbeef".into(), amount, address.to_string());
        let id = genesis.id.clone();
        let block = BlockData {
            header: BlockHeader {
                index: 0,
                supply: 0,
                coin_base: amount,
                difficulty: 0,
                legitimacy: 0,
                prev_hash: Hash256::zero(),
                pos_timestamp: 0,
                timestamp: 0,
                hash: Hash256::zero(),
                nonce: "00000000".into(),
            },
            txs: vec![genesis],
        };
        cache.digest_finalized_blocks(&[block], &settings()).unwrap();
        (cache, Anchor::new(0, id, 0))
    }

    #[test]
    fn push_transaction_rejects_conflicting_input_anchor() {
        let keypair = KeyPair::generate().unwrap();
        let address = keypair.public_key.derive_address(true);
        let (cache, anchor) = funded_cache(&address, 10_000);
        let settings = settings();

        let make_spend = |to: &str| {
            let mut tx = Transaction::new(
                1,
                vec![TxInput::Anchor(anchor.clone())],
                vec![TxOutput::new(5000, to.to_string(), Rule::Sig)],
                vec![],
            );
            let sig = keypair.sign(tx.id.as_bytes()).unwrap();
            tx.witnesses = vec![sig.to_witness()];
            tx
        };

        let mut pool = Mempool::new();
        pool.push_transaction(&cache, make_spend("b"), &settings).unwrap();
        assert_eq!(pool.len(), 1);

        let result = pool.push_transaction(&cache, make_spend("c"), &settings);
        assert!(matches!(result, Err(ContrastError::Conflicting(_))));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn empty_mempool_yields_empty_batch() {
        let pool = Mempool::new();
        assert!(pool.get_most_lucrative_transactions_batch(&settings()).is_empty());
    }

    #[test]
    fn digest_purges_transactions_whose_anchor_was_consumed_on_chain() {
        let keypair = KeyPair::generate().unwrap();
        let address = keypair.public_key.derive_address(true);
        let (cache, anchor) = funded_cache(&address, 10_000);
        let settings = settings();

        let mut tx = Transaction::new(
            1,
            vec![TxInput::Anchor(anchor.clone())],
            vec![TxOutput::new(5000, "b".to_string(), Rule::Sig)],
            vec![],
        );
        let sig = keypair.sign(tx.id.as_bytes()).unwrap();
        tx.witnesses = vec![sig.to_witness()];

        let mut pool = Mempool::new();
        pool.push_transaction(&cache, tx.clone(), &settings).unwrap();

        let block = BlockData {
            header: BlockHeader {
                index: 1,
                supply: 10_000,
                coin_base: 0,
                difficulty: 0,
                legitimacy: 0,
                prev_hash: Hash256::zero(),
                pos_timestamp: 0,
                timestamp: 1,
                hash: Hash256::zero(),
                nonce: "00000000".into(),
            },
            txs: vec![tx],
        };
        pool.digest_finalized_blocks_transactions(&[block]);
        assert!(pool.is_empty());
    }
}
