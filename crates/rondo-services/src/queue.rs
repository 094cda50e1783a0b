//! Task queue: the hand-off between connection handlers and the dispatcher.
//!
//! Unbounded FIFO. Any number of `TaskQueue` producers, one
//! `TaskQueueReceiver` owned by the dispatcher. A re-queued task goes to the
//! tail, so order is only preserved for tasks that never fail dispatch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use rondo_core::TaskRequest;

/// A task waiting for a worker, with its failed dispatch count.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedTask {
    pub request: TaskRequest,
    pub attempts: u32,
}

impl QueuedTask {
    pub fn new(request: TaskRequest) -> Self {
        Self {
            request,
            attempts: 0,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.request.task_id
    }
}

#[derive(Debug, thiserror::Error)]
#[error("task queue closed, dispatcher is gone")]
pub struct QueueClosed(pub QueuedTask);

/// Producer side. Cheap to clone.
#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<QueuedTask>,
    depth: Arc<AtomicUsize>,
}

/// Consumer side. Exactly one exists per queue.
pub struct TaskQueueReceiver {
    rx: mpsc::UnboundedReceiver<QueuedTask>,
    depth: Arc<AtomicUsize>,
}

/// Create a connected producer/consumer pair.
pub fn task_queue() -> (TaskQueue, TaskQueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    (
        TaskQueue {
            tx,
            depth: depth.clone(),
        },
        TaskQueueReceiver { rx, depth },
    )
}

impl TaskQueue {
    /// Enqueue a freshly submitted task.
    pub fn push(&self, request: TaskRequest) -> Result<(), QueueClosed> {
        self.requeue(QueuedTask::new(request))
    }

    /// Put a task back at the tail, keeping its attempt count.
    pub fn requeue(&self, task: QueuedTask) -> Result<(), QueueClosed> {
        self.depth.fetch_add(1, Ordering::Relaxed);
        self.tx.send(task).map_err(|e| {
            self.depth.fetch_sub(1, Ordering::Relaxed);
            QueueClosed(e.0)
        })
    }

    /// Tasks currently waiting.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}

impl TaskQueueReceiver {
    /// Wait up to `poll` for the next task. `None` on timeout.
    ///
    /// The dispatcher holds a producer for re-queuing, so the channel never
    /// closes while it is running; a closed channel also yields `None`.
    pub async fn recv_timeout(&mut self, poll: Duration) -> Option<QueuedTask> {
        match tokio::time::timeout(poll, self.rx.recv()).await {
            Ok(Some(task)) => {
                self.depth.fetch_sub(1, Ordering::Relaxed);
                Some(task)
            }
            Ok(None) | Err(_) => None,
        }
    }
}
