//! Gossip and sync collaborator traits. Real transport (libp2p or
//! otherwise) stays out of scope here; `LoopbackGossip`/`LoopbackSync`
//! wire a node to itself (or to another in-process `Node`) so the `demo`
//! command and integration tests can exercise the same trait boundary a
//! networked deployment would use.

use contrast_core::{BlockData, ContrastError};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};

/// `mpsc::Sender` is `Send` but not `Sync`; wrapping it in a `Mutex` lets
/// `LoopbackGossip` be shared behind `Arc<dyn GossipTransport>` across the
/// task queue's drain thread.
type SyncSender<T> = Mutex<Sender<T>>;

/// Snapshot of a peer's chain position, returned by `SyncPeer::get_status`.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerStatus {
    pub height: u64,
    pub tip_hash: String,
}

pub trait GossipTransport: Send + Sync {
    fn publish_transaction(&self, tx: &[u8]);
    fn publish_candidate(&self, block: &[u8]);
    fn publish_finalized(&self, block: &[u8]);
}

pub trait SyncPeer: Send + Sync {
    fn get_status(&self) -> Result<PeerStatus, ContrastError>;
    fn get_blocks(&self, start: u64, end: u64) -> Result<Vec<BlockData>, ContrastError>;
}

/// In-process gossip stub: publishes feed straight into `mpsc` channels
/// instead of a wire transport. `demo` wires a node's own receivers to
/// drive itself, as if every message it broadcast were echoed back.
pub struct LoopbackGossip {
    tx_sender: SyncSender<Vec<u8>>,
    candidate_sender: SyncSender<Vec<u8>>,
    finalized_sender: SyncSender<Vec<u8>>,
}

impl LoopbackGossip {
    #[must_use]
    pub fn new() -> (Self, LoopbackFeeds) {
        let (tx_sender, tx_receiver) = std::sync::mpsc::channel();
        let (candidate_sender, candidate_receiver) = std::sync::mpsc::channel();
        let (finalized_sender, finalized_receiver) = std::sync::mpsc::channel();
        (
            Self {
                tx_sender: Mutex::new(tx_sender),
                candidate_sender: Mutex::new(candidate_sender),
                finalized_sender: Mutex::new(finalized_sender),
            },
            LoopbackFeeds { tx_receiver, candidate_receiver, finalized_receiver },
        )
    }
}

pub struct LoopbackFeeds {
    pub tx_receiver: Receiver<Vec<u8>>,
    pub candidate_receiver: Receiver<Vec<u8>>,
    pub finalized_receiver: Receiver<Vec<u8>>,
}

impl GossipTransport for LoopbackGossip {
    fn publish_transaction(&self, tx: &[u8]) {
        let _ = self.tx_sender.lock().expect("loopback gossip mutex poisoned").send(tx.to_vec());
    }

    fn publish_candidate(&self, block: &[u8]) {
        let _ = self.candidate_sender.lock().expect("loopback gossip mutex poisoned").send(block.to_vec());
    }

    fn publish_finalized(&self, block: &[u8]) {
        let _ = self.finalized_sender.lock().expect("loopback gossip mutex poisoned").send(block.to_vec());
    }
}

/// In-process sync peer backed by a fixed, shared chain history. Used to
/// exercise `SyncPeer` callers without a real counterpart node.
#[derive(Clone)]
pub struct LoopbackSync {
    blocks: Arc<Mutex<Vec<BlockData>>>,
}

impl LoopbackSync {
    #[must_use]
    pub fn new() -> Self {
        Self { blocks: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn record(&self, block: BlockData) {
        self.blocks.lock().expect("loopback sync mutex poisoned").push(block);
    }
}

impl Default for LoopbackSync {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncPeer for LoopbackSync {
    fn get_status(&self) -> Result<PeerStatus, ContrastError> {
        let blocks = self.blocks.lock().expect("loopback sync mutex poisoned");
        match blocks.last() {
            Some(tip) => Ok(PeerStatus { height: tip.header.index, tip_hash: tip.header.hash.to_string() }),
            None => Err(ContrastError::Unavailable("no blocks recorded".into())),
        }
    }

    fn get_blocks(&self, start: u64, end: u64) -> Result<Vec<BlockData>, ContrastError> {
        let blocks = self.blocks.lock().expect("loopback sync mutex poisoned");
        Ok(blocks.iter().filter(|b| b.header.index >= start && b.header.index <= end).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_gossip_feeds_reach_their_receiver() {
        let (gossip, feeds) = LoopbackGossip::new();
        gossip.publish_transaction(b"tx-bytes");
        assert_eq!(feeds.tx_receiver.recv().unwrap(), b"tx-bytes".to_vec());
    }

    #[test]
    fn loopback_sync_reports_unavailable_before_any_block_is_recorded() {
        let sync = LoopbackSync::new();
        assert!(matches!(sync.get_status(), Err(ContrastError::Unavailable(_))));
    }

    #[test]
    fn loopback_sync_returns_recorded_blocks_in_range() {
        let sync = LoopbackSync::new();
        sync.record(BlockData::genesis(5000, "miner-a"));
        let status = sync.get_status().unwrap();
        assert_eq!(status.height, 0);
        assert_eq!(sync.get_blocks(0, 0).unwrap().len(), 1);
        assert_eq!(sync.get_blocks(1, 5).unwrap().len(), 0);
    }
}
