//! Miner (C9): candidate management bounded by height tolerance, a
//! worker pool computing Argon2id/difficulty checks, and a rolling
//! hashrate estimator. Threads and `Arc<Mutex<_>>` shared state mirror
//! the worker-pool idiom used for parallel header search elsewhere in
//! this codebase, generalized to Argon2id PoW and bet timestamps.

use crate::block::{block_signature, calculate_next_coinbase_reward, meets_difficulty, miner_hash, BlockData};
use crate::config::Settings;
use crate::transaction::Transaction;
use crate::types::{Address, TxInput};
use crate::utxo::MiningDataPoint;
use contrast_shared::crypto::random_hex8;
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

/// A candidate the miner is racing to solve, keyed by `(index, legitimacy)`.
#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    block: BlockData,
}

/// Outcome of a worker's attempt at a single candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum MiningOutcome {
    /// Solved and immediately broadcastable (`timestamp <= now`).
    Solved(BlockData),
    /// Solved but the embedded timestamp is still in the future; the
    /// miner should hold it as `preshoted_pow_block`.
    Preshoted(BlockData),
    /// Did not conform to the difficulty predicate.
    NotConform,
}

/// Per-miner state: bounded candidate set, per-height bet offsets, the
/// preshoted block awaiting its timestamp, and a rolling hashrate
/// estimator.
pub struct Miner {
    address: Address,
    settings: Settings,
    candidates: Mutex<Vec<Candidate>>,
    highest_block_index: Mutex<u64>,
    bets: Mutex<HashMap<u64, i64>>,
    preshoted_pow_block: Mutex<Option<BlockData>>,
    recent_hash_durations_ms: Mutex<VecDeque<f64>>,
    is_mining: Arc<AtomicBool>,
}

const HASHRATE_WINDOW: usize = 64;

impl Miner {
    #[must_use]
    pub fn new(address: Address, settings: Settings) -> Self {
        Self {
            address,
            settings,
            candidates: Mutex::new(Vec::new()),
            highest_block_index: Mutex::new(0),
            bets: Mutex::new(HashMap::new()),
            preshoted_pow_block: Mutex::new(None),
            recent_hash_durations_ms: Mutex::new(VecDeque::new()),
            is_mining: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Rejects duplicates by `(index, legitimacy)`. On a new height,
    /// resets `preshoted_pow_block` and draws a fresh bet.
    pub fn push_candidate(&self, block: BlockData) {
        let index = block.header.index;
        let legitimacy = block.header.legitimacy;

        let mut candidates = self.candidates.lock().expect("miner mutex poisoned");
        if candidates.iter().any(|c| c.block.header.index == index && c.block.header.legitimacy == legitimacy) {
            return;
        }

        let mut highest = self.highest_block_index.lock().expect("miner mutex poisoned");
        if index > *highest {
            *highest = index;
            *self.preshoted_pow_block.lock().expect("miner mutex poisoned") = None;
            self.draw_bet(index);
            candidates.retain(|c| index.saturating_sub(c.block.header.index) <= self.settings.height_tolerance);
        }

        candidates.push(Candidate { block });
    }

    fn draw_bet(&self, height: u64) {
        let target = self.settings.target_block_time_ms as f64;
        let offset_ms = rand::thread_rng().gen_range(0.4..=0.8) * target;
        self.bets.lock().expect("miner mutex poisoned").insert(height, offset_ms as i64);
    }

    fn bet_for(&self, height: u64) -> i64 {
        *self.bets.lock().expect("miner mutex poisoned").get(&height).unwrap_or(&0)
    }

    /// The candidate with minimum legitimacy at the highest known
    /// height, i.e. the most-qualified staker's proposal.
    fn pick_best_candidate(&self) -> Option<BlockData> {
        let highest = *self.highest_block_index.lock().expect("miner mutex poisoned");
        let candidates = self.candidates.lock().expect("miner mutex poisoned");
        candidates
            .iter()
            .filter(|c| c.block.header.index == highest)
            .min_by_key(|c| c.block.header.legitimacy)
            .map(|c| c.block.clone())
    }

    /// Clones and prepares a candidate for mining: timestamp bound by
    /// the bet offset, fresh header/coinbase nonces, coinbase reward
    /// replaced/inserted, header hash left to the worker to solve.
    fn prepare(&self, candidate: &BlockData) -> BlockData {
        let mut block = candidate.clone();
        let bet = self.bet_for(block.header.index);
        block.header.timestamp = (block.header.pos_timestamp + 1 + bet).max(now_ms());
        block.header.nonce = random_hex8();

        let coinbase_nonce = random_hex8();
        let reward = calculate_next_coinbase_reward(candidate, &self.settings);
        let coinbase_tx = Transaction::coinbase(coinbase_nonce, reward, self.address.clone());
        if let Some(pos) = block.txs.iter().position(Transaction::is_coinbase) {
            block.txs[pos] = coinbase_tx;
        } else {
            block.txs.push(coinbase_tx);
        }
        block.header.hash = block_signature(&block, false);
        block
    }

    /// Computes the miner hash for `block` and applies the difficulty
    /// predicate, classifying the result by timestamp.
    fn attempt(&self, block: BlockData) -> MiningOutcome {
        let start = std::time::Instant::now();
        let hash = miner_hash(&block, self.settings.use_dev_hash);
        self.record_hash_duration(start.elapsed().as_secs_f64() * 1000.0);

        if !meets_difficulty(&hash, block.header.difficulty) {
            return MiningOutcome::NotConform;
        }
        if block.header.timestamp <= now_ms() {
            MiningOutcome::Solved(block)
        } else {
            MiningOutcome::Preshoted(block)
        }
    }

    fn record_hash_duration(&self, millis: f64) {
        let mut window = self.recent_hash_durations_ms.lock().expect("miner mutex poisoned");
        window.push_back(millis);
        while window.len() > HASHRATE_WINDOW {
            window.pop_front();
        }
    }

    /// Rolling hashrate estimate (hashes/sec) over the last
    /// `HASHRATE_WINDOW` attempts.
    #[must_use]
    pub fn estimated_hashrate(&self) -> f64 {
        let window = self.recent_hash_durations_ms.lock().expect("miner mutex poisoned");
        if window.is_empty() {
            return 0.0;
        }
        let mean_ms = window.iter().sum::<f64>() / window.len() as f64;
        if mean_ms <= 0.0 {
            0.0
        } else {
            1000.0 / mean_ms
        }
    }

    /// Runs one mining step on a background worker: pick the best
    /// candidate, prepare it, attempt it. Returns `None` if there is
    /// nothing to mine. A preshoted result already past its timestamp
    /// is promoted to `Solved` and cleared.
    pub fn run_one_step(&self) -> Option<MiningOutcome> {
        if let Some(preshoted) = self.preshoted_pow_block.lock().expect("miner mutex poisoned").take() {
            if preshoted.header.timestamp <= now_ms() {
                return Some(MiningOutcome::Solved(preshoted));
            }
            *self.preshoted_pow_block.lock().expect("miner mutex poisoned") = Some(preshoted);
            return None;
        }

        let candidate = self.pick_best_candidate()?;
        let prepared = self.prepare(&candidate);
        let outcome = self.attempt(prepared);
        if let MiningOutcome::Preshoted(ref block) = outcome {
            *self.preshoted_pow_block.lock().expect("miner mutex poisoned") = Some(block.clone());
        }
        Some(outcome)
    }

    /// Spawns `workers` background threads that loop calling
    /// `run_one_step`, invoking `on_solved` whenever a block becomes
    /// broadcastable. Terminating the returned guard stops all workers.
    pub fn spawn_workers<F>(self: &Arc<Self>, workers: usize, on_solved: F) -> MinerHandle
    where
        F: Fn(BlockData) + Send + Sync + 'static,
    {
        self.is_mining.store(true, Ordering::SeqCst);
        let on_solved = Arc::new(on_solved);
        let handles = (0..workers.max(1))
            .map(|_| {
                let miner = Arc::clone(self);
                let on_solved = Arc::clone(&on_solved);
                std::thread::spawn(move || {
                    while miner.is_mining.load(Ordering::SeqCst) {
                        match miner.run_one_step() {
                            Some(MiningOutcome::Solved(block)) => {
                                info!(index = block.header.index, "mined block");
                                on_solved(block);
                            }
                            Some(MiningOutcome::Preshoted(_) | MiningOutcome::NotConform) | None => {
                                std::thread::sleep(std::time::Duration::from_millis(1));
                            }
                        }
                    }
                })
            })
            .collect();
        MinerHandle { is_mining: Arc::clone(&self.is_mining), handles }
    }

    /// Discards the preshoted block, e.g. when a higher block from
    /// another producer has just been accepted.
    pub fn discard_preshoted(&self) {
        *self.preshoted_pow_block.lock().expect("miner mutex poisoned") = None;
    }
}

/// Owns the miner's worker threads; dropping or calling `stop` halts
/// them and joins.
pub struct MinerHandle {
    is_mining: Arc<AtomicBool>,
    handles: Vec<std::thread::JoinHandle<()>>,
}

impl MinerHandle {
    pub fn stop(mut self) {
        self.is_mining.store(false, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for MinerHandle {
    fn drop(&mut self) {
        self.is_mining.store(false, Ordering::SeqCst);
    }
}

/// Moving-window difficulty retarget over `blockMiningData`, targeting
/// `target_block_time_ms`. Classic Bitcoin-style ratio adjustment,
/// clamped to avoid single-window overshoot.
#[must_use]
pub fn next_difficulty(window: &std::collections::VecDeque<MiningDataPoint>, current: u32, settings: &Settings) -> u32 {
    if window.len() < 2 {
        return current;
    }
    let first = window.front().unwrap();
    let last = window.back().unwrap();
    let actual_span_ms = (last.timestamp - first.timestamp).max(1) as f64;
    let expected_span_ms = settings.target_block_time_ms as f64 * (window.len() - 1) as f64;
    let ratio = (expected_span_ms / actual_span_ms).clamp(0.25, 4.0);
    ((current as f64) * ratio).round().clamp(0.0, u32::MAX as f64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockHeader;
    use contrast_shared::hash::Hash256;

    fn settings() -> Settings {
        let mut s = Settings::default();
        s.use_dev_hash = true;
        s.target_block_time_ms = 1000;
        s
    }

    fn candidate_block(index: u64, legitimacy: u32, difficulty: u32) -> BlockData {
        BlockData {
            header: BlockHeader {
                index,
                supply: 0,
                coin_base: 0,
                difficulty,
                legitimacy,
                prev_hash: Hash256::zero(),
                pos_timestamp: now_ms() - 10_000,
                timestamp: 0,
                hash: Hash256::zero(),
                nonce: "00000000".into(),
            },
            txs: vec![Transaction::pos_reward("staker".into(), "a".repeat(64), 1, "staker".into())],
        }
    }

    #[test]
    fn push_candidate_rejects_duplicate_index_and_legitimacy() {
        let miner = Miner::new("miner-a".into(), settings());
        miner.push_candidate(candidate_block(1, 0, 0));
        miner.push_candidate(candidate_block(1, 0, 0));
        assert_eq!(miner.candidates.lock().unwrap().len(), 1);
    }

    #[test]
    fn new_height_resets_preshoted_and_draws_bet() {
        let miner = Miner::new("miner-a".into(), settings());
        miner.push_candidate(candidate_block(1, 0, 0));
        assert!(miner.bets.lock().unwrap().contains_key(&1));
    }

    #[test]
    fn zero_difficulty_candidate_mines_immediately() {
        let miner = Miner::new("miner-a".into(), settings());
        miner.push_candidate(candidate_block(1, 0, 0));
        let outcome = miner.run_one_step().unwrap();
        assert!(matches!(outcome, MiningOutcome::Solved(_)));
    }

    #[test]
    fn next_difficulty_increases_when_blocks_come_too_fast() {
        let mut window = std::collections::VecDeque::new();
        window.push_back(MiningDataPoint { index: 0, difficulty: 16, timestamp: 0, pos_timestamp: 0 });
        window.push_back(MiningDataPoint { index: 1, difficulty: 16, timestamp: 100, pos_timestamp: 0 });
        let settings = settings();
        let next = next_difficulty(&window, 16, &settings);
        assert!(next > 16);
    }
}
