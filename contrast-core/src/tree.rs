//! Block tree & fork choice (C7): a hash-keyed arena with a bounded LRU
//! eviction policy, mirroring the map+order-list idiom used for bounded
//! caches elsewhere in this codebase rather than an owning, cycle-prone
//! parent/child tree.

use contrast_shared::hash::Hash256;
use std::collections::{HashMap, HashSet, LinkedList};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub hash: Hash256,
    pub prev_hash: Hash256,
    pub height: u64,
    pub score: u64,
    pub children: Vec<Hash256>,
    pub subtree_score: u64,
}

/// `score` is kept a pure function of block height per the fork-choice
/// design note; callers must never substitute a stateful measure here.
#[must_use]
pub fn score_of(height: u64) -> u64 {
    height
}

#[derive(Debug, Default)]
pub struct BlockTree {
    nodes: HashMap<Hash256, TreeNode>,
    leaves: HashSet<Hash256>,
    /// MRU-front, LRU-back order, mirroring the map+list eviction idiom
    /// used by other bounded caches in this core.
    order: LinkedList<Hash256>,
    max_blocks: usize,
}

impl BlockTree {
    #[must_use]
    pub fn new(max_blocks: usize) -> Self {
        Self { nodes: HashMap::new(), leaves: HashSet::new(), order: LinkedList::new(), max_blocks }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn contains(&self, hash: &Hash256) -> bool {
        self.nodes.contains_key(hash)
    }

    #[must_use]
    pub fn get(&self, hash: &Hash256) -> Option<&TreeNode> {
        self.nodes.get(hash)
    }

    /// Inserts the genesis node with no parent link.
    pub fn add_genesis(&mut self, hash: Hash256, height: u64) {
        let score = score_of(height);
        self.nodes.insert(
            hash,
            TreeNode { hash, prev_hash: Hash256::zero(), height, score, children: Vec::new(), subtree_score: score },
        );
        self.leaves.insert(hash);
        self.touch(hash);
        self.evict_if_needed();
    }

    /// Links `hash` under `prev_hash`, updates the leaf set and
    /// propagates `score` up into every ancestor's `subtree_score`.
    pub fn add_block(&mut self, hash: Hash256, prev_hash: Hash256, height: u64) {
        let score = score_of(height);
        self.nodes
            .insert(hash, TreeNode { hash, prev_hash, height, score, children: Vec::new(), subtree_score: score });

        if let Some(parent) = self.nodes.get_mut(&prev_hash) {
            parent.children.push(hash);
        }
        self.leaves.remove(&prev_hash);
        self.leaves.insert(hash);

        self.propagate_subtree_score(prev_hash, score);
        self.touch(hash);
        self.evict_if_needed();
    }

    fn propagate_subtree_score(&mut self, mut cursor: Hash256, added: u64) {
        loop {
            let Some(node) = self.nodes.get_mut(&cursor) else { break };
            node.subtree_score += added;
            let next = node.prev_hash;
            if next == cursor || next == Hash256::zero() {
                break;
            }
            cursor = next;
        }
    }

    fn touch(&mut self, hash: Hash256) {
        let mut rebuilt = LinkedList::new();
        let mut found = false;
        while let Some(h) = self.order.pop_front() {
            if h == hash {
                found = true;
                continue;
            }
            rebuilt.push_back(h);
        }
        self.order = rebuilt;
        let _ = found;
        self.order.push_front(hash);
    }

    /// Every node reachable by walking `prev_hash` from a current leaf back
    /// to genesis. Eviction must never touch this set: a non-leaf ancestor
    /// on a live path is exactly what `ancestors()`/`get_reorg_path()` need
    /// to still find once a later reorg walks back through it.
    fn protected_set(&self) -> HashSet<Hash256> {
        self.leaves.iter().flat_map(|leaf| self.ancestors(leaf)).collect()
    }

    fn evict_if_needed(&mut self) {
        let excess = self.order.len().saturating_sub(self.max_blocks);
        if excess == 0 {
            return;
        }
        let protected = self.protected_set();
        let mut to_evict = HashSet::new();
        for h in self.order.iter().rev() {
            if to_evict.len() >= excess {
                break;
            }
            if !protected.contains(h) {
                to_evict.insert(*h);
            }
        }
        if to_evict.is_empty() {
            return;
        }
        for h in &to_evict {
            self.nodes.remove(h);
        }
        let mut rebuilt = LinkedList::new();
        while let Some(h) = self.order.pop_front() {
            if !to_evict.contains(&h) {
                rebuilt.push_back(h);
            }
        }
        self.order = rebuilt;
    }

    /// Leaf with maximum `subtree_score`, ties broken by greater height,
    /// then lexicographically greater hash for full determinism.
    #[must_use]
    pub fn find_best_block(&self) -> Option<&TreeNode> {
        self.leaves
            .iter()
            .filter_map(|h| self.nodes.get(h))
            .max_by(|a, b| {
                a.subtree_score
                    .cmp(&b.subtree_score)
                    .then(a.height.cmp(&b.height))
                    .then(a.hash.to_string().cmp(&b.hash.to_string()))
            })
    }

    /// `candidate` is strictly better than `current` per the same order
    /// used by `find_best_block`.
    #[must_use]
    pub fn should_reorg(&self, current: &Hash256, candidate: &Hash256) -> bool {
        let (Some(cur), Some(cand)) = (self.nodes.get(current), self.nodes.get(candidate)) else { return false };
        let ordering = cand
            .subtree_score
            .cmp(&cur.subtree_score)
            .then(cand.height.cmp(&cur.height))
            .then(cand.hash.to_string().cmp(&cur.hash.to_string()));
        ordering == std::cmp::Ordering::Greater
    }

    fn ancestors(&self, from: &Hash256) -> Vec<Hash256> {
        let mut path = Vec::new();
        let mut cursor = *from;
        loop {
            path.push(cursor);
            let Some(node) = self.nodes.get(&cursor) else { break };
            if node.prev_hash == Hash256::zero() || node.prev_hash == cursor {
                break;
            }
            cursor = node.prev_hash;
        }
        path
    }

    /// `{revert, apply}`: blocks to undo walking tip-ward from `current`
    /// down to (exclusive of) the common ancestor, and blocks to apply
    /// walking from the common ancestor (exclusive) up to `candidate`.
    #[must_use]
    pub fn get_reorg_path(&self, current: &Hash256, candidate: &Hash256) -> Option<ReorgPath> {
        let current_path = self.ancestors(current);
        let candidate_path = self.ancestors(candidate);
        let candidate_set: HashSet<_> = candidate_path.iter().copied().collect();

        let common_ancestor = current_path.iter().copied().find(|h| candidate_set.contains(h))?;

        let revert: Vec<Hash256> = current_path.into_iter().take_while(|h| *h != common_ancestor).collect();
        let mut apply: Vec<Hash256> =
            candidate_path.into_iter().take_while(|h| *h != common_ancestor).collect();
        apply.reverse();

        Some(ReorgPath { common_ancestor, revert, apply })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorgPath {
    pub common_ancestor: Hash256,
    pub revert: Vec<Hash256>,
    pub apply: Vec<Hash256>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(byte: u8) -> Hash256 {
        let mut bytes = [0u8; 32];
        bytes[31] = byte;
        Hash256::from_bytes(bytes)
    }

    #[test]
    fn best_block_prefers_higher_subtree_score() {
        let mut tree = BlockTree::new(100);
        tree.add_genesis(h(0), 0);
        tree.add_block(h(1), h(0), 1);
        tree.add_block(h(2), h(1), 2);
        tree.add_block(h(3), h(0), 1);

        let best = tree.find_best_block().unwrap();
        assert_eq!(best.hash, h(2));
    }

    #[test]
    fn should_reorg_is_true_only_for_strictly_better_candidate() {
        let mut tree = BlockTree::new(100);
        tree.add_genesis(h(0), 0);
        tree.add_block(h(1), h(0), 1);
        tree.add_block(h(2), h(0), 1);
        tree.add_block(h(3), h(2), 2);

        assert!(tree.should_reorg(&h(1), &h(3)));
        assert!(!tree.should_reorg(&h(3), &h(1)));
    }

    #[test]
    fn reorg_path_finds_common_ancestor_and_ordered_legs() {
        let mut tree = BlockTree::new(100);
        tree.add_genesis(h(0), 0);
        tree.add_block(h(1), h(0), 1);
        tree.add_block(h(2), h(1), 2);
        tree.add_block(h(3), h(1), 2);
        tree.add_block(h(4), h(3), 3);

        let path = tree.get_reorg_path(&h(2), &h(4)).unwrap();
        assert_eq!(path.common_ancestor, h(1));
        assert_eq!(path.revert, vec![h(2)]);
        assert_eq!(path.apply, vec![h(3), h(4)]);
    }

    #[test]
    fn eviction_never_removes_current_leaves() {
        let mut tree = BlockTree::new(2);
        tree.add_genesis(h(0), 0);
        tree.add_block(h(1), h(0), 1);
        tree.add_block(h(2), h(1), 2);
        tree.add_block(h(3), h(2), 3);

        assert!(tree.contains(&h(3)));
        assert!(tree.leaves.contains(&h(3)));
    }

    #[test]
    fn eviction_never_removes_ancestors_of_a_current_leaf() {
        let mut tree = BlockTree::new(2);
        tree.add_genesis(h(0), 0);
        tree.add_block(h(1), h(0), 1);
        tree.add_block(h(2), h(1), 2);
        tree.add_block(h(3), h(2), 3);
        tree.add_block(h(4), h(3), 4);

        // The single leaf's entire ancestor chain back to genesis must
        // still be reachable even though it's five deep against a max of 2.
        for ancestor in [h(0), h(1), h(2), h(3), h(4)] {
            assert!(tree.contains(&ancestor), "ancestor {ancestor} was evicted");
        }
        let path = tree.get_reorg_path(&h(4), &h(0));
        assert!(path.is_some());
    }
}
