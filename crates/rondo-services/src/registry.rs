//! Worker registry: tracks registered workers and their outbound channels.
//!
//! Membership changes bump a generation number so the dispatcher can tell
//! when its round-robin order has gone stale. Snapshots are taken under the
//! read lock and are never torn.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, RwLock};

use rondo_core::WorkerId;

use crate::queue::QueuedTask;

/// Handle to one live worker connection.
///
/// Tasks are not written to the socket here: they go to the connection's
/// writer task, which owns the write half.
#[derive(Clone, Debug)]
pub struct WorkerHandle {
    pub id: WorkerId,
    pub peer_addr: SocketAddr,
    pub registered_at: Instant,
    outbound: mpsc::UnboundedSender<QueuedTask>,
    dispatched: Arc<AtomicU64>,
}

impl WorkerHandle {
    /// Hand a task to the worker's writer. Gives the task back if the writer
    /// has already shut down.
    pub fn send(&self, task: QueuedTask) -> Result<(), QueuedTask> {
        self.outbound.send(task).map_err(|e| e.0)?;
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Tasks handed to this worker so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }
}

/// Ordered view of the registry at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub generation: u64,
    /// Ascending by worker sequence number.
    pub workers: Vec<WorkerId>,
}

impl Membership {
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

#[derive(Default)]
struct Members {
    workers: BTreeMap<WorkerId, WorkerHandle>,
    generation: u64,
    last_seq: u64,
}

/// The worker registry. Cloned into every connection handler and the
/// dispatcher.
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    inner: Arc<RwLock<Members>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next worker id and insert its handle in one step.
    /// Ids start at `worker_1` and are never reused.
    pub async fn register(
        &self,
        peer_addr: SocketAddr,
        outbound: mpsc::UnboundedSender<QueuedTask>,
    ) -> WorkerHandle {
        let mut members = self.inner.write().await;
        members.last_seq += 1;
        let handle = WorkerHandle {
            id: WorkerId::new(members.last_seq),
            peer_addr,
            registered_at: Instant::now(),
            outbound,
            dispatched: Arc::new(AtomicU64::new(0)),
        };
        members.workers.insert(handle.id, handle.clone());
        members.generation += 1;
        handle
    }

    /// Remove a worker. Idempotent; only an actual removal changes the generation.
    pub async fn remove(&self, id: WorkerId) -> Option<WorkerHandle> {
        let mut members = self.inner.write().await;
        let removed = members.workers.remove(&id);
        if removed.is_some() {
            members.generation += 1;
        }
        removed
    }

    pub async fn get(&self, id: WorkerId) -> Option<WorkerHandle> {
        self.inner.read().await.workers.get(&id).cloned()
    }

    pub async fn snapshot(&self) -> Membership {
        let members = self.inner.read().await;
        Membership {
            generation: members.generation,
            workers: members.workers.keys().copied().collect(),
        }
    }

    /// All live handles, in registration order.
    pub async fn handles(&self) -> Vec<WorkerHandle> {
        self.inner.read().await.workers.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.workers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
