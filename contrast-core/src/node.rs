//! Node state machine (C10): owns every other state-bearing component
//! behind one value (per the "no singletons" design note) and runs the
//! finalized-proposal digest pipeline plus candidate creation.

use crate::block::{block_signature, calculate_next_coinbase_reward, meets_difficulty, miner_hash, BlockData};
use crate::config::Settings;
use crate::error::{ContrastError, Result};
use crate::mempool::Mempool;
use crate::snapshot::SnapshotManager;
use crate::storage::{self, StorageAdapter};
use crate::transaction::Transaction;
use crate::tree::BlockTree;
use crate::types::TxInput;
use crate::utxo::UtxoCache;
use crate::validation;
use crate::vss::Vss;
use contrast_shared::hash::Hash256;
use std::collections::HashMap;
use std::sync::mpsc::Sender;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Validator,
    Miner,
    Both,
}

impl Role {
    #[must_use]
    pub fn mines(self) -> bool {
        matches!(self, Role::Miner | Role::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    LoadingFromStorage,
    Idle,
    Mining,
    Validating,
    Syncing,
}

pub struct Node {
    pub address: String,
    pub role: Role,
    pub settings: Settings,
    pub state: State,
    pub utxo_cache: UtxoCache,
    pub mempool: Mempool,
    pub vss: Vss,
    pub tree: BlockTree,
    pub snapshots: SnapshotManager,
    blocks: HashMap<Hash256, BlockData>,
    known_pubkeys: HashMap<String, String>,
    last_index: Option<u64>,
    tip_hash: Hash256,
    events: Option<Sender<crate::events::ContrastEvent>>,
    storage: Option<Box<dyn StorageAdapter>>,
}

impl Node {
    #[must_use]
    pub fn new(address: String, role: Role, settings: Settings) -> Self {
        let max_in_memory_blocks = settings.max_in_memory_blocks;
        Self {
            address,
            role,
            settings,
            state: State::LoadingFromStorage,
            utxo_cache: UtxoCache::new(),
            mempool: Mempool::new(),
            vss: Vss::new(),
            tree: BlockTree::new(max_in_memory_blocks),
            snapshots: SnapshotManager::new(max_in_memory_blocks),
            blocks: HashMap::new(),
            known_pubkeys: HashMap::new(),
            last_index: None,
            tip_hash: Hash256::zero(),
            events: None,
            storage: None,
        }
    }

    pub fn with_event_channel(mut self, sender: Sender<crate::events::ContrastEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Attaches a persistence backend. Once set, every digested block is
    /// written through to it (§4.9 step 8) so a bounded in-memory tree
    /// still has a durable fallback for ancestors it has to evict.
    pub fn with_storage(mut self, storage: Box<dyn StorageAdapter>) -> Self {
        self.storage = Some(storage);
        self
    }

    fn emit(&self, event: crate::events::ContrastEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }

    #[must_use]
    pub fn current_height(&self) -> Option<u64> {
        self.last_index
    }

    #[must_use]
    pub fn tip_hash(&self) -> Hash256 {
        self.tip_hash
    }

    pub fn push_transaction(&mut self, tx: Transaction) -> Result<()> {
        self.mempool.push_transaction(&self.utxo_cache, tx.clone(), &self.settings)?;
        self.emit(crate::events::ContrastEvent::TransactionBroadcasted { tx_id: tx.id });
        Ok(())
    }

    /// Runs the ten-step finalized-proposal digest pipeline. On success
    /// the tip advances (possibly via a reorg); on failure no state has
    /// mutated.
    pub fn digest_finalized_proposal(&mut self, block: BlockData) -> Result<()> {
        self.state = State::Validating;
        let result = self.digest_inner(block);
        self.state = State::Idle;
        result
    }

    fn digest_inner(&mut self, block: BlockData) -> Result<()> {
        let index = block.header.index;

        // A block already on file is a duplicate (gossip echo, re-sync) and
        // is accepted as a no-op rather than re-running the pipeline.
        if self.blocks.contains_key(&block.header.hash) {
            return Ok(());
        }

        // 1. Index must be the immediate successor of a known parent (or
        // genesis). Validated against the referenced parent rather than a
        // single global counter, so a sibling of an already-accepted block
        // at the same height can still be submitted and later win fork
        // choice in step 9.
        if index == 0 {
            if self.last_index.is_some() {
                return Err(ContrastError::InvalidBlockIndex("genesis already digested".into()));
            }
        } else {
            let parent_height = self
                .blocks
                .get(&block.header.prev_hash)
                .map(|parent| parent.header.index)
                .ok_or_else(|| ContrastError::InvalidBlockIndex(format!("block {index}: unknown parent")))?;
            if index != parent_height + 1 {
                return Err(ContrastError::InvalidBlockIndex(format!(
                    "block {index}: expected {} given its parent",
                    parent_height + 1
                )));
            }
        }

        // A block whose parent is not the current tip is a competing
        // branch: rebase the cache onto that parent first so the checks
        // below (and the atomic digest in step 6) run against the correct
        // ancestry instead of whatever branch the cache happens to hold.
        if index != 0 && block.header.prev_hash != self.tip_hash {
            self.reorg_to(block.header.prev_hash)?;
        }

        // 2. Recompute the content hash and confirm it matches; recompute
        // the miner hash and confirm it meets the difficulty predicate.
        let recomputed = block_signature(&block, false);
        if recomputed != block.header.hash {
            return Err(ContrastError::HashNonConform(format!("block {index}: signature mismatch")));
        }
        let pow_hash = miner_hash(&block, self.settings.use_dev_hash);
        if !meets_difficulty(&pow_hash, block.header.difficulty) {
            return Err(ContrastError::HashNonConform(format!("block {index}: difficulty not met")));
        }

        // 3. Coinbase amount must match the expected schedule (except genesis).
        if let Some(prev) = self.blocks.get(&block.header.prev_hash) {
            let expected = calculate_next_coinbase_reward(prev, &self.settings);
            let actual = block.coinbase_tx().map(|tx| tx.total_output_value()).unwrap_or(0);
            if actual != expected {
                return Err(ContrastError::InvalidCoinbase(format!("block {index}: expected {expected}, got {actual}")));
            }
        }

        // 4. No anchor spent twice within the block.
        validation::is_finalized_block_double_spending(&self.utxo_cache, &block)?;

        // 5. Every transaction passes full validation.
        for tx in &block.txs {
            validation::full_transaction_validation(
                &self.utxo_cache,
                &mut self.known_pubkeys,
                tx,
                tx.is_coinbase(),
                self.settings.use_dev_hash,
                &self.settings,
            )?;
        }

        // 6. Digest atomically (clone-before-mutate happens inside).
        let new_stakes = self.utxo_cache.digest_finalized_blocks(std::slice::from_ref(&block), &self.settings)?;
        for stake in new_stakes {
            self.vss.add_stake(stake.address, stake.anchor, stake.amount, self.settings.max_supply);
        }

        // 7. Mempool catch-up.
        self.mempool.clear_transactions_who_utxos_are_spent(&self.utxo_cache);
        self.mempool.digest_finalized_blocks_transactions(std::slice::from_ref(&block));

        // 8. Append to the tree, persist, snapshot if due.
        let hash = block.header.hash;
        if index == 0 {
            self.tree.add_genesis(hash, index);
        } else {
            self.tree.add_block(hash, block.header.prev_hash, index);
        }
        self.blocks.insert(hash, block.clone());
        self.last_index = Some(index);
        if index % self.settings.snapshot_interval == 0 {
            self.snapshots.take_snapshot(index, &self.utxo_cache, &self.vss);
        }
        self.persist_block(&block);
        self.emit(crate::events::ContrastEvent::BroadcastFinalizedBlock(block));

        // 9. Fork choice: reorg if a better leaf exists elsewhere.
        if let Some(best) = self.tree.find_best_block() {
            let best_hash = best.hash;
            if best_hash != hash && self.tree.should_reorg(&hash, &best_hash) {
                self.reorg_to(best_hash)?;
            } else {
                self.tip_hash = hash;
            }
        } else {
            self.tip_hash = hash;
        }

        info!(index = self.last_index, tip = %self.tip_hash, "digested finalized block");
        Ok(())
    }

    /// Writes the persisted key conventions documented on
    /// `StorageAdapter` (height -> hash, hash -> block, info -> header,
    /// current height) for one digested block. A no-op when no backend is
    /// attached. Encoding failures are logged and skipped rather than
    /// failing the digest, matching the task queue's log-and-continue
    /// policy for non-fatal errors.
    fn persist_block(&mut self, block: &BlockData) {
        let Some(backend) = self.storage.as_mut() else { return };
        let hash_hex = block.header.hash.to_string();

        backend.put(&storage::height_key(block.header.index), hash_hex.as_bytes());
        backend.put(storage::CURRENT_HEIGHT_KEY, block.header.index.to_string().as_bytes());

        match serde_json::to_vec(block) {
            Ok(encoded) => backend.put(hash_hex.as_bytes(), &encoded),
            Err(err) => warn!(%hash_hex, %err, "failed to encode block for storage"),
        }
        match serde_json::to_vec(&block.header) {
            Ok(encoded) => backend.put(&storage::info_key(&hash_hex), &encoded),
            Err(err) => warn!(%hash_hex, %err, "failed to encode block header for storage"),
        }
    }

    fn reorg_to(&mut self, candidate: Hash256) -> Result<()> {
        let path = self
            .tree
            .get_reorg_path(&self.tip_hash, &candidate)
            .ok_or_else(|| ContrastError::SnapshotMissing(0))?;
        let common_height = self
            .tree
            .get(&path.common_ancestor)
            .map(|n| n.height)
            .ok_or(ContrastError::SnapshotMissing(0))?;

        self.snapshots.restore_snapshot(common_height, &mut self.utxo_cache, &mut self.vss)?;
        self.last_index = Some(common_height);

        for hash in &path.apply {
            let Some(block) = self.blocks.get(hash).cloned() else { continue };
            let new_stakes = self.utxo_cache.digest_finalized_blocks(std::slice::from_ref(&block), &self.settings)?;
            for stake in new_stakes {
                self.vss.add_stake(stake.address, stake.anchor, stake.amount, self.settings.max_supply);
            }
            self.last_index = Some(block.header.index);
        }

        self.tip_hash = candidate;
        Ok(())
    }

    /// Collects a mempool batch, computes the next difficulty, resolves
    /// this node's legitimacy for the current tip, and builds a new
    /// candidate `BlockData` prepended with a PoS-reward transaction.
    /// Returns `None` if this node is not qualified this round.
    #[must_use]
    pub fn create_candidate(&self) -> Option<BlockData> {
        let tip = self.blocks.get(&self.tip_hash)?;
        let ranking = self.vss.calculate_round_legitimacies(&self.tip_hash.to_string(), 100);
        let legitimacy = self.vss.get_address_legitimacy(&self.address, &ranking);
        if legitimacy >= ranking.len() {
            return None;
        }

        let next_index = tip.header.index + 1;
        let difficulty = crate::mining::next_difficulty(self.utxo_cache.mining_data(), tip.header.difficulty, &self.settings);
        let mut txs = vec![Transaction::pos_reward(self.address.clone(), self.tip_hash.to_string(), 0, self.address.clone())];
        txs.extend(self.mempool.get_most_lucrative_transactions_batch(&self.settings));

        let header = crate::block::BlockHeader {
            index: next_index,
            supply: tip.header.supply + tip.header.coin_base,
            coin_base: calculate_next_coinbase_reward(tip, &self.settings),
            difficulty,
            legitimacy: legitimacy as u32,
            prev_hash: self.tip_hash,
            pos_timestamp: chrono::Utc::now().timestamp_millis(),
            timestamp: 0,
            hash: Hash256::zero(),
            nonce: String::new(),
        };
        let mut candidate = BlockData { header, txs };
        candidate.header.hash = block_signature(&candidate, false);
        Some(candidate)
    }
}
