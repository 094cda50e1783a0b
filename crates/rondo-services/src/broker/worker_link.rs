//! Broker side of a registered worker connection.
//!
//! Each worker gets two tasks: a writer that owns the write half and drains
//! the worker's outbound channel, and a reader (run inline on the connection
//! task) that forwards results to waiting clients. When the reader sees EOF
//! or an error, the worker is deregistered.

use std::net::SocketAddr;

use tokio::io::AsyncWrite;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use rondo_core::codec::{read_frame, write_frame};
use rondo_core::{Envelope, TaskResult, WorkerId};

use super::BrokerState;
use crate::dispatcher::{abandon, attempts_exhausted};
use crate::queue::QueuedTask;

pub(super) async fn serve_worker(state: BrokerState, stream: TcpStream, peer_addr: SocketAddr) {
    let (mut reader, mut writer) = stream.into_split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();

    // Registered before the reply so the dispatcher can queue work right away;
    // those tasks wait in the channel until the writer starts below, so
    // REGISTERED is always the first frame the worker sees.
    let worker_id = state.registry.register(peer_addr, outbound_tx).await.id;

    if let Err(e) = write_frame(&mut writer, &Envelope::Registered { worker_id }).await {
        tracing::warn!(%worker_id, %peer_addr, error = %e, "failed to confirm registration");
        state.registry.remove(worker_id).await;
        requeue_remaining(&state, &mut outbound_rx);
        return;
    }
    tracing::info!(%worker_id, %peer_addr, "worker registered");

    tokio::spawn(write_loop(state.clone(), worker_id, writer, outbound_rx));

    read_loop(&state, worker_id, &mut reader).await;

    state.registry.remove(worker_id).await;
    tracing::info!(%worker_id, "worker disconnected");
}

async fn read_loop(state: &BrokerState, worker_id: WorkerId, reader: &mut OwnedReadHalf) {
    loop {
        match read_frame::<TaskResult, _>(reader).await {
            Ok(Some(result)) => forward_result(state, worker_id, result),
            Ok(None) => {
                tracing::debug!(%worker_id, "worker closed connection");
                return;
            }
            Err(e) => {
                tracing::warn!(%worker_id, error = %e, "worker read failed");
                return;
            }
        }
    }
}

fn forward_result(state: &BrokerState, worker_id: WorkerId, result: TaskResult) {
    state.stats.record_completed();
    tracing::info!(
        task_id = %result.task_id,
        %worker_id,
        status = ?result.status,
        "task completed"
    );

    // A slow client must not stall this worker's reader.
    let state = state.clone();
    tokio::spawn(async move {
        match state.pending.deliver(&result).await {
            Ok(true) => state.stats.record_forwarded(),
            Ok(false) => {
                tracing::debug!(task_id = %result.task_id, "no client waiting for result, dropped");
            }
            Err(e) => {
                tracing::debug!(task_id = %result.task_id, error = %e, "client went away before result");
            }
        }
    });
}

async fn write_loop<W>(
    state: BrokerState,
    worker_id: WorkerId,
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<QueuedTask>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(task) = outbound.recv().await {
        let envelope = Envelope::Task(task.request);
        if let Err(e) = write_frame(&mut writer, &envelope).await {
            tracing::warn!(%worker_id, error = %e, "write to worker failed");
            // Deregister first so the dispatcher cannot pick this worker
            // for the task being handed back.
            state.registry.remove(worker_id).await;
            if let Envelope::Task(request) = envelope {
                let failed = QueuedTask {
                    request,
                    attempts: task.attempts + 1,
                };
                if attempts_exhausted(state.max_dispatch_attempts, failed.attempts) {
                    abandon(&state.pending, &state.stats, failed);
                } else {
                    requeue(&state, failed);
                }
            }
            requeue_remaining(&state, &mut outbound);
            return;
        }
    }
}

/// Close the channel so further sends fail fast, then hand everything
/// already buffered back to the queue.
fn requeue_remaining(state: &BrokerState, outbound: &mut mpsc::UnboundedReceiver<QueuedTask>) {
    outbound.close();
    while let Ok(task) = outbound.try_recv() {
        requeue(state, task);
    }
}

fn requeue(state: &BrokerState, task: QueuedTask) {
    state.stats.record_requeued();
    if let Err(e) = state.queue.requeue(task) {
        tracing::error!(task_id = e.0.task_id(), "task queue closed, dropping task");
    }
}
