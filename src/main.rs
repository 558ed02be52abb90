use clap::{Args, Parser, Subcommand};
use contrast_core::{BlockData, ContrastError, Node, Role, Settings, Task, TaskQueue};
use contrast_shared::crypto::KeyPair;
use std::sync::mpsc;
use std::sync::Arc;
use tracing::{info, Level};

mod network;
mod storage;

use network::{GossipTransport, LoopbackGossip, LoopbackSync, SyncPeer};
use storage::MemoryStorage;

#[derive(Parser)]
#[command(name = "contrast-node")]
#[command(about = "Contrast - PoW/PoS hybrid cryptocurrency node")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node's task queue and, if mining, its worker pool.
    Run(RunArgs),
    /// Scripted walk-through: genesis, transfer, mine, reorg.
    Demo,
    /// Print the node's default configuration.
    Status,
}

#[derive(Args)]
struct RunArgs {
    /// This node's address (used for coinbase/PoS rewards).
    #[arg(short, long, default_value = "node-address")]
    address: String,

    /// Node role.
    #[arg(long, value_enum, default_value = "validator")]
    role: RoleArg,

    /// Number of mining worker threads (only used when role mines).
    #[arg(long, default_value = "1")]
    mining_threads: usize,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Use reduced-cost cryptographic parameters (devnets/tests only).
    #[arg(long, action = clap::ArgAction::SetTrue)]
    dev_hash: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum RoleArg {
    Validator,
    Miner,
    Both,
}

impl From<RoleArg> for Role {
    fn from(value: RoleArg) -> Self {
        match value {
            RoleArg::Validator => Role::Validator,
            RoleArg::Miner => Role::Miner,
            RoleArg::Both => Role::Both,
        }
    }
}

fn init_logging(log_level: &str) {
    let level = match log_level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}

#[tokio::main]
async fn main() -> Result<(), ContrastError> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run(args)) => run_node(args).await,
        Some(Commands::Demo) => demo().await,
        Some(Commands::Status) => {
            show_status();
            Ok(())
        }
        None => demo().await,
    }
}

/// Starts a node's task queue and, when the role mines, its miner worker
/// pool. Blocks until Ctrl+C, digesting pushed transactions and finalized
/// proposals off the task queue as the teacher's P2P node blocks in its
/// own event loop.
async fn run_node(args: RunArgs) -> Result<(), ContrastError> {
    init_logging(&args.log_level);

    let mut settings = Settings::default();
    settings.use_dev_hash = args.dev_hash;
    let role: Role = args.role.into();

    info!(address = %args.address, role = ?role, "starting contrast node");

    let (event_sender, _event_receiver) = mpsc::channel();
    let node = Arc::new(std::sync::Mutex::new(
        Node::new(args.address.clone(), role, settings.clone())
            .with_event_channel(event_sender)
            .with_storage(Box::new(MemoryStorage::new())),
    ));

    let (gossip, _feeds) = LoopbackGossip::new();
    let gossip: Arc<dyn GossipTransport> = Arc::new(gossip);
    let sync_peer: Arc<dyn SyncPeer> = Arc::new(LoopbackSync::new());

    let queue = TaskQueue::new();
    let drain_node = Arc::clone(&node);
    let drain_gossip = Arc::clone(&gossip);
    let drain_sync_peer = Arc::clone(&sync_peer);
    let _drain_handle = queue.spawn_drain_loop(move |task| {
        let mut node = drain_node.lock().expect("node mutex poisoned");
        match task {
            Task::PushTransaction(tx) => {
                let serialized = serde_json::to_vec(&tx).unwrap_or_default();
                node.push_transaction(tx)?;
                drain_gossip.publish_transaction(&serialized);
                Ok(())
            }
            Task::DigestPowProposal(block) => {
                let serialized = serde_json::to_vec(&block).unwrap_or_default();
                node.digest_finalized_proposal(block)?;
                drain_gossip.publish_finalized(&serialized);
                Ok(())
            }
            Task::SyncWithKnownPeers => match drain_sync_peer.get_status() {
                Ok(status) => {
                    info!(peer_height = status.height, peer_tip = %status.tip_hash, "checked known peer");
                    Ok(())
                }
                Err(err) => Err(err),
            },
        }
    });

    queue.push(Task::SyncWithKnownPeers, false);

    let _miner_handle = if role.mines() {
        info!(threads = args.mining_threads, "mining enabled");
        let miner = Arc::new(contrast_core::mining::Miner::new(args.address.clone(), settings.clone()));
        let miner_queue = queue.clone();
        let handle = miner.spawn_workers(args.mining_threads, move |block| {
            miner_queue.push(Task::DigestPowProposal(block), true);
        });

        let candidate_node = Arc::clone(&node);
        let candidate_miner = Arc::clone(&miner);
        std::thread::spawn(move || loop {
            if let Some(candidate) = candidate_node.lock().expect("node mutex poisoned").create_candidate() {
                candidate_miner.push_candidate(candidate);
            }
            std::thread::sleep(std::time::Duration::from_millis(200));
        });

        Some(handle)
    } else {
        None
    };

    info!("node running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await.map_err(|e| ContrastError::Unavailable(e.to_string()))?;
    info!("shutdown signal received, stopping node");
    Ok(())
}

/// Scripted genesis -> transfer -> mine walk-through, in the spirit of
/// the teacher's own Sprint 1 demo.
async fn demo() -> Result<(), ContrastError> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    println!("Contrast node demo");
    println!("===================");

    let mut settings = Settings::default();
    settings.use_dev_hash = true;
    settings.min_fee_per_byte = 0.0;

    println!("\n1. Generating a miner keypair...");
    let miner_keys = KeyPair::generate().map_err(|e| ContrastError::Malformed(e.to_string()))?;
    let miner_address = miner_keys.public_key.derive_address(true);
    println!("   address: {miner_address}");

    println!("\n2. Digesting the genesis block...");
    let mut node = Node::new(miner_address.clone(), Role::Both, settings.clone());
    let genesis = BlockData::genesis(settings.block_reward, &miner_address);
    node.digest_finalized_proposal(genesis.clone())?;
    println!("   height: {:?}", node.current_height());
    println!("   balance({miner_address}): {}", node.utxo_cache.balance_of(&miner_address));

    println!("\n3. Creating a transfer transaction...");
    let recipient_keys = KeyPair::generate().map_err(|e| ContrastError::Malformed(e.to_string()))?;
    let recipient_address = recipient_keys.public_key.derive_address(true);
    let anchor = contrast_core::Anchor::new(0, genesis.txs[0].id.clone(), 0);
    let mut spend = contrast_core::Transaction::new(
        1,
        vec![contrast_core::TxInput::Anchor(anchor)],
        vec![
            contrast_core::TxOutput::new(settings.block_reward - 1_000, miner_address.clone(), contrast_core::Rule::Sig),
            contrast_core::TxOutput::new(1_000, recipient_address.clone(), contrast_core::Rule::Sig),
        ],
        vec![],
    );
    let signature = miner_keys.sign(spend.id.as_bytes()).map_err(|e| ContrastError::Malformed(e.to_string()))?;
    spend.witnesses = vec![signature.to_witness()];
    node.push_transaction(spend.clone())?;
    println!("   mempool size: {}", node.mempool.len());

    println!("\n4. Creating and digesting a second block...");
    let reward = contrast_core::block::calculate_next_coinbase_reward(&genesis, &settings);
    let coinbase2 = contrast_core::Transaction::coinbase("00000001".into(), reward, miner_address.clone());
    let mut second = BlockData {
        header: contrast_core::BlockHeader {
            index: 1,
            supply: settings.block_reward,
            coin_base: reward,
            difficulty: 0,
            legitimacy: 0,
            prev_hash: genesis.header.hash,
            pos_timestamp: 0,
            timestamp: 0,
            hash: contrast_shared::hash::Hash256::zero(),
            nonce: "00000000".into(),
        },
        txs: vec![spend, coinbase2],
    };
    second.header.hash = contrast_core::block::block_signature(&second, false);
    node.digest_finalized_proposal(second)?;

    println!("   height: {:?}", node.current_height());
    println!("   balance({miner_address}): {}", node.utxo_cache.balance_of(&miner_address));
    println!("   balance({recipient_address}): {}", node.utxo_cache.balance_of(&recipient_address));
    println!("   mempool size: {}", node.mempool.len());

    println!("\nDemo complete.");
    Ok(())
}

fn show_status() {
    let settings = Settings::default();
    println!("Contrast node v0.1.0");
    println!();
    println!("Default configuration:");
    println!("  target_block_time_ms: {}", settings.target_block_time_ms);
    println!("  max_block_size:       {}", settings.max_block_size);
    println!("  max_supply:           {}", settings.max_supply);
    println!("  block_reward:         {}", settings.block_reward);
    println!("  halving_interval:     {}", settings.halving_interval);
    println!("  snapshot_interval:    {}", settings.snapshot_interval);
    println!("  max_in_memory_blocks: {}", settings.max_in_memory_blocks);
    println!("  height_tolerance:     {}", settings.height_tolerance);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_arg_maps_onto_core_role() {
        assert_eq!(Role::from(RoleArg::Miner), Role::Miner);
        assert_eq!(Role::from(RoleArg::Both), Role::Both);
    }
}
