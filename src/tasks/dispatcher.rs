use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};

/// Shared tail of the dispatch queue. Workers take turns pulling one task id
/// each; a task is delivered to exactly one worker.
pub type TaskQueue = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<i64>>>;

/// Hands task ids to the worker pool and tracks pre-dispatch batch
/// cancellation.
///
/// Cancellation is cooperative: a worker consults `is_cancelled` before
/// claiming a task and skips it (leaving it `pending`); a task already
/// mid-execution runs to completion. The flags are in-memory only; the queue
/// they guard does not survive a restart either.
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<i64>,
    cancelled_batches: Mutex<HashSet<String>>,
}

impl Dispatcher {
    pub fn new() -> (Arc<Self>, TaskQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(Self {
            tx,
            cancelled_batches: Mutex::new(HashSet::new()),
        });
        (dispatcher, Arc::new(tokio::sync::Mutex::new(rx)))
    }

    pub fn enqueue(&self, task_id: i64) -> Result<()> {
        self.tx
            .send(task_id)
            .context("dispatch queue is closed; no workers are running")
    }

    pub fn cancel_batch(&self, batch_id: &str) {
        let mut set = self
            .cancelled_batches
            .lock()
            .expect("cancel set lock poisoned");
        set.insert(batch_id.to_string());
    }

    pub fn is_cancelled(&self, batch_id: &str) -> bool {
        let set = self
            .cancelled_batches
            .lock()
            .expect("cancel set lock poisoned");
        set.contains(batch_id)
    }
}

/// Coordinator for worker shutdown. Holds a shutdown broadcast sender.
pub struct BackgroundCoordinator {
    shutdown_tx: broadcast::Sender<()>,
}

impl BackgroundCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { shutdown_tx }
    }

    /// Get a shutdown receiver for a worker.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signal all workers to stop after their current unit of work.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Default for BackgroundCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
