//! Snapshot manager (C8): a bounded LRU of deep-copied UTXO cache / VSS
//! state keyed by block height, used to roll the state core back to a
//! known-good height on reorg.

use crate::error::{ContrastError, Result};
use crate::utxo::UtxoCache;
use crate::vss::Vss;
use std::collections::{HashMap, LinkedList};

#[derive(Debug, Clone)]
struct Snapshot {
    utxo_cache: UtxoCache,
    vss: Vss,
}

#[derive(Debug, Default)]
pub struct SnapshotManager {
    snapshots: HashMap<u64, Snapshot>,
    order: LinkedList<u64>,
    capacity: usize,
}

impl SnapshotManager {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { snapshots: HashMap::new(), order: LinkedList::new(), capacity }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    #[must_use]
    pub fn has(&self, height: u64) -> bool {
        self.snapshots.contains_key(&height)
    }

    /// Deep-copies `utxo_cache`/`vss` and stores them under `height`,
    /// evicting the least-recently-taken snapshot if at capacity.
    pub fn take_snapshot(&mut self, height: u64, utxo_cache: &UtxoCache, vss: &Vss) {
        self.snapshots.insert(height, Snapshot { utxo_cache: utxo_cache.clone(), vss: vss.clone() });
        self.order.push_front(height);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_back() {
                self.snapshots.remove(&oldest);
            } else {
                break;
            }
        }
    }

    /// Overwrites `utxo_cache`/`vss` with the snapshot stored at
    /// `height`. Missing snapshots are a fatal error per the design note
    /// that a failed restore must never leave the core silently corrupt.
    pub fn restore_snapshot(&self, height: u64, utxo_cache: &mut UtxoCache, vss: &mut Vss) -> Result<()> {
        let snapshot = self.snapshots.get(&height).ok_or(ContrastError::SnapshotMissing(height))?;
        *utxo_cache = snapshot.utxo_cache.clone();
        *vss = snapshot.vss.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockData, BlockHeader};
    use crate::config::Settings;
    use crate::transaction::Transaction;
    use contrast_shared::hash::Hash256;

    fn coinbase_block(index: u64, miner: &str, reward: u64) -> BlockData {
        let tx = Transaction::coinbase(format!("{index:08x}"), reward, miner.to_string());
        BlockData {
            header: BlockHeader {
                index,
                supply: 0,
                coin_base: reward,
                difficulty: 0,
                legitimacy: 0,
                prev_hash: Hash256::zero(),
                pos_timestamp: 0,
                timestamp: 0,
                hash: Hash256::zero(),
                nonce: "00000000".into(),
            },
            txs: vec![tx],
        }
    }

    #[test]
    fn restore_recovers_the_state_at_the_snapshotted_height() {
        let settings = Settings::default();
        let mut cache = UtxoCache::new();
        cache.digest_finalized_blocks(&[coinbase_block(0, "A", 100)], &settings).unwrap();

        let mut manager = SnapshotManager::new(10);
        manager.take_snapshot(0, &cache, &Vss::new());

        cache.digest_finalized_blocks(&[coinbase_block(1, "A", 50)], &settings).unwrap();
        assert_eq!(cache.balance_of("A"), 150);

        let mut vss = Vss::new();
        manager.restore_snapshot(0, &mut cache, &mut vss).unwrap();
        assert_eq!(cache.balance_of("A"), 100);
    }

    #[test]
    fn restoring_a_missing_height_is_fatal() {
        let manager = SnapshotManager::new(10);
        let mut cache = UtxoCache::new();
        let mut vss = Vss::new();
        let err = manager.restore_snapshot(5, &mut cache, &mut vss).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn eviction_respects_capacity() {
        let settings = Settings::default();
        let cache = {
            let mut c = UtxoCache::new();
            c.digest_finalized_blocks(&[coinbase_block(0, "A", 1)], &settings).unwrap();
            c
        };
        let mut manager = SnapshotManager::new(2);
        manager.take_snapshot(0, &cache, &Vss::new());
        manager.take_snapshot(1, &cache, &Vss::new());
        manager.take_snapshot(2, &cache, &Vss::new());
        assert_eq!(manager.len(), 2);
        assert!(!manager.has(0));
    }
}
