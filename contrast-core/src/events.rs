//! Node events: a fixed set of notifications the state core emits over
//! an `mpsc` channel so collaborators (gossip, UI, metrics) can observe
//! state transitions without the core holding a reference to them.

use crate::block::BlockData;
use crate::types::Address;
use contrast_shared::hash::Hash256;

#[derive(Debug, Clone, PartialEq)]
pub enum ContrastEvent {
    BroadcastNewCandidate(BlockData),
    BroadcastFinalizedBlock(BlockData),
    HashRateUpdated { address: Address, hashes_per_second: f64 },
    BalanceUpdated { address: Address, balance: u64 },
    TransactionBroadcasted { tx_id: String },
    UtxoSpent { anchor_owner: Address, block_hash: Hash256 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_variants_are_constructible_and_comparable() {
        let a = ContrastEvent::TransactionBroadcasted { tx_id: "abc".into() };
        let b = ContrastEvent::TransactionBroadcasted { tx_id: "abc".into() };
        assert_eq!(a, b);
    }
}
