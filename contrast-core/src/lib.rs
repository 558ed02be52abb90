pub mod block;
pub mod config;
pub mod error;
pub mod events;
pub mod mempool;
pub mod mining;
pub mod node;
pub mod snapshot;
pub mod storage;
pub mod task_queue;
pub mod transaction;
pub mod tree;
pub mod types;
pub mod utxo;
pub mod validation;
pub mod vss;

pub use block::{BlockData, BlockHeader};
pub use config::Settings;
pub use error::{ContrastError, Result};
pub use events::ContrastEvent;
pub use mempool::Mempool;
pub use node::{Node, Role};
pub use snapshot::SnapshotManager;
pub use storage::StorageAdapter;
pub use task_queue::{Task, TaskQueue};
pub use transaction::{Transaction, TxOutput, Utxo};
pub use tree::BlockTree;
pub use types::{Address, Amount, Anchor, BlockHeight, OutputIndex, Rule, Timestamp, TxInput};
pub use utxo::UtxoCache;
pub use vss::{StakeRef, Vss};
