//! Validation rules (C3): pure functions over a UTXO cache snapshot. No
//! module here holds state of its own.

use crate::block::BlockData;
use crate::config::Settings;
use crate::error::{ContrastError, Result};
use crate::transaction::Transaction;
use crate::types::{Address, Rule, TxInput};
use crate::utxo::UtxoCache;
use contrast_shared::crypto::{PublicKey, Signature};
use std::collections::{HashMap, HashSet};

/// Checks version, outputs shape, amount bounds, address format, rule
/// validity and (for non-sentinel transactions) input resolution.
pub fn is_well_formed_transaction(
    cache: &UtxoCache,
    tx: &Transaction,
    is_coinbase: bool,
    settings: &Settings,
) -> Result<()> {
    if tx.version == 0 {
        return Err(ContrastError::Malformed(format!("tx {}: version 0", tx.id)));
    }
    if tx.outputs.is_empty() {
        return Err(ContrastError::Malformed(format!("tx {}: no outputs", tx.id)));
    }
    if tx.inputs.is_empty() {
        return Err(ContrastError::Malformed(format!("tx {}: no inputs", tx.id)));
    }

    for output in &tx.outputs {
        if output.amount > settings.max_supply {
            return Err(ContrastError::Malformed(format!("tx {}: amount exceeds max supply", tx.id)));
        }
        if output.address.is_empty() {
            return Err(ContrastError::Malformed(format!("tx {}: empty address", tx.id)));
        }
        if let Rule::LockUntilBlock(height) = output.rule {
            if height == 0 {
                return Err(ContrastError::Malformed(format!("tx {}: zero lock height", tx.id)));
            }
        }
    }

    let expected_id = Transaction::compute_id(&tx.inputs, &tx.outputs, tx.version);
    if expected_id != tx.id {
        return Err(ContrastError::Malformed(format!("tx {}: id does not match content", tx.id)));
    }

    if is_coinbase {
        if !tx.is_coinbase() {
            return Err(ContrastError::Malformed(format!("tx {}: expected coinbase shape", tx.id)));
        }
        return Ok(());
    }

    if tx.is_sentinel() {
        // PoS-reward transactions carry no resolvable anchor input.
        return Ok(());
    }

    let mut seen = HashSet::new();
    for input in &tx.inputs {
        match input {
            TxInput::Anchor(anchor) => {
                if !seen.insert(anchor.clone()) {
                    return Err(ContrastError::Malformed(format!("tx {}: duplicate anchor input", tx.id)));
                }
                if cache.get_by_anchor(anchor).is_none() {
                    return Err(ContrastError::UnresolvedInput(anchor.to_string()));
                }
            }
            _ => return Err(ContrastError::Malformed(format!("tx {}: non-anchor input in non-coinbase tx", tx.id))),
        }
    }

    Ok(())
}

/// `sum(inputs.amount) - sum(outputs.amount)`, failing if negative.
pub fn remaining_amount(cache: &UtxoCache, tx: &Transaction) -> Result<u64> {
    let mut total_in: u64 = 0;
    for input in &tx.inputs {
        if let TxInput::Anchor(anchor) = input {
            let utxo = cache.get_by_anchor(anchor).ok_or_else(|| ContrastError::UnresolvedInput(anchor.to_string()))?;
            total_in += utxo.output.amount;
        }
    }
    let total_out = tx.total_output_value();
    total_in
        .checked_sub(total_out)
        .ok_or_else(|| ContrastError::InsufficientFunds(format!("tx {}: inputs {total_in} < outputs {total_out}", tx.id)))
}

/// `SigOrSlash` is only valid as output[0], and only when the
/// transaction's fee exceeds that output's amount.
pub fn control_tx_output_rules(tx: &Transaction, fee: u64) -> Result<()> {
    for (i, output) in tx.outputs.iter().enumerate() {
        if matches!(output.rule, Rule::SigOrSlash) {
            if i != 0 {
                return Err(ContrastError::Malformed(format!("tx {}: SigOrSlash must be output 0", tx.id)));
            }
            if fee <= output.amount {
                return Err(ContrastError::Malformed(format!(
                    "tx {}: SigOrSlash fee {fee} does not exceed amount {}",
                    tx.id, output.amount
                )));
            }
        }
    }
    Ok(())
}

/// Every witness signature must verify against its declared public key
/// over the message `tx.id`.
pub fn control_all_witnesses(tx: &Transaction) -> Result<()> {
    for witness in &tx.witnesses {
        let signature = Signature::from_witness(witness)
            .map_err(|e| ContrastError::Malformed(format!("tx {}: bad witness encoding: {e}", tx.id)))?;
        let ok = signature
            .verify(tx.id.as_bytes())
            .map_err(|e| ContrastError::Malformed(format!("tx {}: signature error: {e}", tx.id)))?;
        if !ok {
            return Err(ContrastError::Malformed(format!("tx {}: witness signature does not verify", tx.id)));
        }
    }
    Ok(())
}

/// Derives the address owned by each witness's public key and confirms it
/// matches the spent UTXO's owner, populating `known_pubkeys` as a cache
/// of `pubKeyHex -> address`.
pub fn address_ownership_confirmation(
    cache: &UtxoCache,
    tx: &Transaction,
    known_pubkeys: &mut HashMap<String, Address>,
    use_dev_hash: bool,
) -> Result<()> {
    let anchors: Vec<_> = tx.inputs.iter().filter_map(TxInput::as_anchor).collect();
    if anchors.len() != tx.witnesses.len() {
        return Err(ContrastError::Malformed(format!(
            "tx {}: {} anchor inputs but {} witnesses",
            tx.id,
            anchors.len(),
            tx.witnesses.len()
        )));
    }

    for (anchor, witness) in anchors.iter().zip(tx.witnesses.iter()) {
        let signature = Signature::from_witness(witness)
            .map_err(|e| ContrastError::Malformed(format!("tx {}: bad witness encoding: {e}", tx.id)))?;
        let pubkey_hex = signature.public_key().to_hex();
        let derived_address = known_pubkeys
            .entry(pubkey_hex)
            .or_insert_with(|| signature.public_key().derive_address(use_dev_hash));

        let utxo = cache.get_by_anchor(anchor).ok_or_else(|| ContrastError::UnresolvedInput(anchor.to_string()))?;
        if &utxo.output.address != derived_address {
            return Err(ContrastError::Malformed(format!("tx {}: witness does not own input {anchor}", tx.id)));
        }
    }
    Ok(())
}

/// Anchors consumed across all non-sentinel transactions in `block` are
/// unique and all resolve in `cache`.
pub fn is_finalized_block_double_spending(cache: &UtxoCache, block: &BlockData) -> Result<()> {
    let mut seen = HashSet::new();
    for tx in &block.txs {
        if tx.is_sentinel() {
            continue;
        }
        for input in &tx.inputs {
            if let TxInput::Anchor(anchor) = input {
                if !seen.insert(anchor.clone()) {
                    return Err(ContrastError::Conflicting(format!("anchor {anchor} spent twice in block")));
                }
                if cache.get_by_anchor(anchor).is_none() {
                    return Err(ContrastError::UnresolvedInput(anchor.to_string()));
                }
            }
        }
    }
    Ok(())
}

/// Composes the transaction-level checks above into one outcome.
pub fn full_transaction_validation(
    cache: &UtxoCache,
    known_pubkeys: &mut HashMap<String, Address>,
    tx: &Transaction,
    is_coinbase: bool,
    use_dev_hash: bool,
    settings: &Settings,
) -> Result<()> {
    is_well_formed_transaction(cache, tx, is_coinbase, settings)?;
    if tx.is_sentinel() {
        return Ok(());
    }
    let fee = remaining_amount(cache, tx)?;
    control_tx_output_rules(tx, fee)?;
    control_all_witnesses(tx)?;
    address_ownership_confirmation(cache, tx, known_pubkeys, use_dev_hash)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TxOutput;
    use crate::types::Anchor;
    use contrast_shared::crypto::KeyPair;

    #[test]
    fn well_formed_rejects_zero_version() {
        let cache = UtxoCache::new();
        let settings = Settings::default();
        let tx = Transaction { version: 0, ..Transaction::coinbase("deadbeef".into(), 10, "a".into()) };
        assert!(is_well_formed_transaction(&cache, &tx, true, &settings).is_err());
    }

    #[test]
    fn full_validation_accepts_a_correctly_signed_spend() {
        let mut cache = UtxoCache::new();
        let settings = Settings::default();
        let keypair = KeyPair::generate().unwrap();
        let address = keypair.public_key.derive_address(true);

        let genesis = Transaction::coinbase("deadbeef".into(), 1000, address.clone());
        let genesis_block = BlockData {
            header: crate::block::BlockHeader {
                index: 0,
                supply: 0,
                coin_base: 1000,
                difficulty: 0,
                legitimacy: 0,
                prev_hash: contrast_shared::hash::Hash256::zero(),
                pos_timestamp: 0,
                timestamp: 0,
                hash: contrast_shared::hash::Hash256::zero(),
                nonce: "00000000".into(),
            },
            txs: vec![genesis],
        };
        cache.digest_finalized_blocks(&[genesis_block.clone()], &settings).unwrap();
        let anchor = Anchor::new(0, genesis_block.txs[0].id.clone(), 0);

        let mut spend =
            Transaction::new(1, vec![TxInput::Anchor(anchor)], vec![TxOutput::new(500, "b".into(), Rule::Sig)], vec![]);
        let signature = keypair.sign(spend.id.as_bytes()).unwrap();
        spend.witnesses = vec![signature.to_witness()];

        let mut known = HashMap::new();
        assert!(full_transaction_validation(&cache, &mut known, &spend, false, true, &settings).is_ok());
    }

    #[test]
    fn sig_or_slash_requires_fee_greater_than_amount() {
        let tx = Transaction::new(1, vec![], vec![TxOutput::new(100, "a".into(), Rule::SigOrSlash)], vec![]);
        assert!(control_tx_output_rules(&tx, 50).is_err());
        assert!(control_tx_output_rules(&tx, 150).is_ok());
    }
}
