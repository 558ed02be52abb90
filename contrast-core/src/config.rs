//! Node configuration. Every option recognized by the core is named here,
//! mirroring the teacher's `NetworkParams`/`NodeConfig` default-constructed
//! settings structs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Target time between blocks, in milliseconds.
    pub target_block_time_ms: i64,
    /// Maximum serialized block size, in bytes.
    pub max_block_size: usize,
    /// Hard cap on total supply, in micro-units.
    pub max_supply: u64,
    /// Initial block reward before any halving.
    pub block_reward: u64,
    /// Floor reward after halvings have driven it below this value.
    pub min_block_reward: u64,
    /// Number of blocks between reward halvings.
    pub halving_interval: u64,
    /// Minimum fee-per-byte accepted by the mempool.
    pub min_fee_per_byte: f64,
    /// Blocks between automatic snapshots.
    pub snapshot_interval: u64,
    /// Maximum number of blocks retained in the in-memory block tree.
    pub max_in_memory_blocks: usize,
    /// Soft cap on the mempool's known-pubkey-to-address cache.
    pub max_known_pubkeys: usize,
    /// Height tolerance window for candidates accepted by the miner.
    pub height_tolerance: u64,
    /// Whether cryptographic routines run with reduced cost parameters,
    /// appropriate for devnets/tests only.
    pub use_dev_hash: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_block_time_ms: 60_000,
            max_block_size: 4_000_000,
            max_supply: 21_000_000_000_000,
            block_reward: 5_000_000_000,
            min_block_reward: 1,
            halving_interval: 210_000,
            min_fee_per_byte: 0.001,
            snapshot_interval: 100,
            max_in_memory_blocks: 1000,
            max_known_pubkeys: 1_000_000,
            height_tolerance: 6,
            use_dev_hash: false,
        }
    }
}
