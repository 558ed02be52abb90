//! Task queue (C11): a single-consumer FIFO that serializes all
//! state-mutating work, drained by a cooperative background loop.
//! Mirrors the teacher's `std::thread`/`Arc<Mutex<_>>` worker-pool idiom
//! rather than introducing an async runtime into the core.

use crate::block::BlockData;
use crate::error::ContrastError;
use crate::transaction::Transaction;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    PushTransaction(Transaction),
    DigestPowProposal(BlockData),
    SyncWithKnownPeers,
}

#[derive(Debug, Default)]
struct Inner {
    queue: VecDeque<Task>,
    sync_in_flight: bool,
}

/// Shared handle to the FIFO; cloneable across the node's call sites and
/// the background drain loop.
#[derive(Debug, Clone, Default)]
pub struct TaskQueue {
    inner: Arc<Mutex<Inner>>,
    /// Cleared while work is pending so the miner yields CPU, per the
    /// `canProceedMining` cooperative-scheduling rule.
    can_proceed_mining: Arc<Mutex<bool>>,
}

impl TaskQueue {
    #[must_use]
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(Inner::default())), can_proceed_mining: Arc::new(Mutex::new(true)) }
    }

    #[must_use]
    pub fn can_proceed_mining(&self) -> bool {
        *self.can_proceed_mining.lock().expect("task queue mutex poisoned")
    }

    /// Enqueues `task`. `SyncWithKnownPeers` is dropped (deduplicated)
    /// while a sync is already in flight. `first_place` inserts at the
    /// front, used to schedule candidate creation right after a
    /// successful digest.
    pub fn push(&self, task: Task, first_place: bool) {
        let mut inner = self.inner.lock().expect("task queue mutex poisoned");
        if matches!(task, Task::SyncWithKnownPeers) && inner.sync_in_flight {
            return;
        }
        if matches!(task, Task::SyncWithKnownPeers) {
            inner.sync_in_flight = true;
        }
        if first_place {
            inner.queue.push_front(task);
        } else {
            inner.queue.push_back(task);
        }
        self.set_can_proceed_mining(inner.queue.is_empty());
    }

    fn set_can_proceed_mining(&self, value: bool) {
        *self.can_proceed_mining.lock().expect("task queue mutex poisoned") = value;
    }

    fn pop(&self) -> Option<Task> {
        let mut inner = self.inner.lock().expect("task queue mutex poisoned");
        let task = inner.queue.pop_front();
        if matches!(task, Some(Task::SyncWithKnownPeers)) {
            inner.sync_in_flight = false;
        }
        let empty = inner.queue.is_empty();
        drop(inner);
        self.set_can_proceed_mining(empty);
        task
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("task queue mutex poisoned").queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drains tasks one at a time, passing each to `handler`. Errors
    /// matching the skip-log policy are swallowed silently; all others
    /// are logged and the loop continues. Runs until `self` has no more
    /// clones outside the spawned thread's own handle, or the process
    /// exits.
    pub fn spawn_drain_loop<F>(&self, mut handler: F) -> std::thread::JoinHandle<()>
    where
        F: FnMut(Task) -> Result<(), ContrastError> + Send + 'static,
    {
        let queue = self.clone();
        std::thread::spawn(move || loop {
            match queue.pop() {
                Some(task) => {
                    if let Err(err) = handler(task) {
                        if err.skip_log_matches() {
                            continue;
                        }
                        if err.is_fatal() {
                            error!(error = %err, "fatal error in task queue, halting state progress");
                        } else {
                            warn!(error = %err, "task execution failed, continuing");
                        }
                    }
                }
                None => std::thread::sleep(Duration::from_millis(20)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_place_inserts_at_front() {
        let queue = TaskQueue::new();
        queue.push(Task::SyncWithKnownPeers, false);
        queue.push(Task::PushTransaction(Transaction::coinbase("deadbeef".into(), 1, "a".into())), true);
        assert_eq!(queue.len(), 2);
        assert!(matches!(queue.pop(), Some(Task::PushTransaction(_))));
    }

    #[test]
    fn duplicate_sync_while_in_flight_is_dropped() {
        let queue = TaskQueue::new();
        queue.push(Task::SyncWithKnownPeers, false);
        queue.push(Task::SyncWithKnownPeers, false);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn can_proceed_mining_clears_while_work_pending() {
        let queue = TaskQueue::new();
        assert!(queue.can_proceed_mining());
        queue.push(Task::SyncWithKnownPeers, false);
        assert!(!queue.can_proceed_mining());
        queue.pop();
        assert!(queue.can_proceed_mining());
    }
}
