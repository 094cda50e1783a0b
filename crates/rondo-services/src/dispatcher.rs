//! Dispatcher: assigns queued tasks to workers in round-robin order.
//!
//! One dispatcher runs per broker. It is deliberately a single loop so the
//! round-robin order stays deterministic.

use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use rondo_core::config::BrokerConfig;
use rondo_core::wire::BROKER_ORIGIN;
use rondo_core::{TaskResult, WorkerId};

use crate::pending::PendingResponses;
use crate::queue::{QueuedTask, TaskQueue, TaskQueueReceiver};
use crate::registry::{Membership, WorkerRegistry};
use crate::stats::BrokerStats;

// ── Round-robin cursor ────────────────────────────────────────────────────────

/// Cursor over an ordered snapshot of worker ids.
///
/// The snapshot is rebuilt whenever the registry generation changes or the
/// cursor is invalidated. After a rebuild, selection resumes with the first
/// worker that sorts after the last one picked, so a removed worker's slot
/// is skipped and newcomers join at the end of the cycle.
#[derive(Debug, Default)]
pub struct RoundRobinCursor {
    generation: Option<u64>,
    order: Vec<WorkerId>,
    next: usize,
    last: Option<WorkerId>,
}

impl RoundRobinCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&mut self) {
        self.generation = None;
    }

    /// Pick the next worker, or `None` if the snapshot is empty.
    pub fn select(&mut self, membership: &Membership) -> Option<WorkerId> {
        if membership.is_empty() {
            self.invalidate();
            return None;
        }

        if self.generation != Some(membership.generation) {
            self.order = membership.workers.clone();
            self.generation = Some(membership.generation);
            self.next = self
                .last
                .and_then(|last| self.order.iter().position(|id| *id > last))
                .unwrap_or(0);
        }

        let id = self.order[self.next];
        self.next = (self.next + 1) % self.order.len();
        self.last = Some(id);
        Some(id)
    }
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Longest wait on an empty queue before looping.
    pub poll_interval: Duration,
    /// Pause after finding no workers.
    pub empty_pool_backoff: Duration,
    /// Failed sends before giving up on a task. 0 = never give up.
    pub max_attempts: u32,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from(&BrokerConfig::default())
    }
}

impl From<&BrokerConfig> for DispatchSettings {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            empty_pool_backoff: config.empty_pool_backoff(),
            max_attempts: config.max_dispatch_attempts,
        }
    }
}

/// What happened to one dequeued task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent(WorkerId),
    /// Registry empty; task re-queued after the backoff.
    NoWorkers,
    /// Send failed or the worker vanished; task re-queued.
    Requeued,
    /// Attempt budget exhausted; the client got an error result.
    Abandoned,
}

pub struct Dispatcher<C = TcpStream> {
    registry: WorkerRegistry,
    pending: PendingResponses<C>,
    queue: TaskQueue,
    rx: TaskQueueReceiver,
    stats: BrokerStats,
    settings: DispatchSettings,
    cursor: RoundRobinCursor,
}

impl<C> Dispatcher<C>
where
    C: AsyncWrite + Unpin + Send + Sync + 'static,
{
    pub fn new(
        registry: WorkerRegistry,
        pending: PendingResponses<C>,
        queue: TaskQueue,
        rx: TaskQueueReceiver,
        stats: BrokerStats,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            registry,
            pending,
            queue,
            rx,
            stats,
            settings,
            cursor: RoundRobinCursor::new(),
        }
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
        tracing::info!(
            poll_ms = self.settings.poll_interval.as_millis() as u64,
            max_attempts = self.settings.max_attempts,
            "dispatcher started"
        );

        loop {
            let task = tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("dispatcher shutting down");
                    return Ok(());
                }
                task = self.rx.recv_timeout(self.settings.poll_interval) => task,
            };

            if let Some(task) = task {
                self.dispatch_one(task).await;
            }
        }
    }

    /// Try to place one task with the next worker in line.
    pub async fn dispatch_one(&mut self, task: QueuedTask) -> DispatchOutcome {
        let membership = self.registry.snapshot().await;

        let Some(worker_id) = self.cursor.select(&membership) else {
            tracing::debug!(task_id = task.task_id(), "no workers registered, requeueing");
            self.requeue(task);
            tokio::time::sleep(self.settings.empty_pool_backoff).await;
            return DispatchOutcome::NoWorkers;
        };

        let Some(handle) = self.registry.get(worker_id).await else {
            // Removed between snapshot and lookup.
            self.cursor.invalidate();
            self.requeue(task);
            return DispatchOutcome::Requeued;
        };

        let task_id = task.task_id().to_string();
        match handle.send(task) {
            Ok(()) => {
                self.stats.record_dispatched();
                tracing::info!(%task_id, worker_id = %worker_id, "task dispatched");
                DispatchOutcome::Sent(worker_id)
            }
            Err(mut task) => {
                self.cursor.invalidate();
                task.attempts += 1;
                tracing::warn!(
                    %task_id,
                    worker_id = %worker_id,
                    attempts = task.attempts,
                    "send to worker failed"
                );
                if attempts_exhausted(self.settings.max_attempts, task.attempts) {
                    abandon(&self.pending, &self.stats, task);
                    DispatchOutcome::Abandoned
                } else {
                    self.requeue(task);
                    DispatchOutcome::Requeued
                }
            }
        }
    }

    fn requeue(&self, task: QueuedTask) {
        self.stats.record_requeued();
        if let Err(e) = self.queue.requeue(task) {
            tracing::error!(task_id = e.0.task_id(), "task queue closed, dropping task");
        }
    }
}

/// True once a task has used up a nonzero attempt budget.
pub(crate) fn attempts_exhausted(max_attempts: u32, attempts: u32) -> bool {
    max_attempts > 0 && attempts >= max_attempts
}

/// Give up on a task: the waiting client, if any, gets an error result.
pub(crate) fn abandon<C>(pending: &PendingResponses<C>, stats: &BrokerStats, task: QueuedTask)
where
    C: AsyncWrite + Unpin + Send + Sync + 'static,
{
    stats.record_abandoned();
    let result = TaskResult::failure(
        task.request.task_id,
        BROKER_ORIGIN,
        format!("dispatch failed after {} attempts", task.attempts),
    );
    tracing::warn!(task_id = %result.task_id, "task abandoned");

    let pending = pending.clone();
    tokio::spawn(async move {
        if let Err(e) = pending.deliver(&result).await {
            tracing::debug!(task_id = %result.task_id, error = %e, "client gone before abandon notice");
        }
    });
}
