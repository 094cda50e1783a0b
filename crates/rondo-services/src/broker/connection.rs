//! Per-connection handler. The first frame decides what the peer is.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;

use rondo_core::codec::read_frame;
use rondo_core::{Envelope, TaskRequest};

use super::{worker_link, BrokerState};

pub(super) async fn handle_connection(
    state: BrokerState,
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handshake_timeout: Duration,
) {
    let first = match tokio::time::timeout(handshake_timeout, read_frame::<Envelope, _>(&mut stream)).await {
        Err(_) => {
            tracing::warn!(%peer_addr, "no message before handshake timeout, closing");
            return;
        }
        Ok(Ok(Some(envelope))) => envelope,
        Ok(Ok(None)) => {
            tracing::debug!(%peer_addr, "connection closed before first message");
            return;
        }
        Ok(Err(e)) => {
            tracing::warn!(%peer_addr, error = %e, "malformed first message, closing");
            return;
        }
    };

    match first {
        Envelope::WorkerRegister => worker_link::serve_worker(state, stream, peer_addr).await,
        Envelope::Task(request) => accept_task(&state, stream, peer_addr, request),
        Envelope::Registered { worker_id } => {
            tracing::warn!(%peer_addr, %worker_id, "unexpected REGISTERED from peer, closing");
        }
    }
}

/// Park the client connection and queue its task. The result is written
/// later by the worker link that receives it.
fn accept_task(state: &BrokerState, stream: TcpStream, peer_addr: SocketAddr, request: TaskRequest) {
    let task_id = request.task_id.clone();
    tracing::info!(
        %task_id,
        task_type = %request.task_type,
        %peer_addr,
        "task received"
    );

    if state.pending.insert(task_id.clone(), stream).is_some() {
        tracing::warn!(%task_id, "duplicate task_id, previous client connection dropped");
    }
    state.stats.record_received();

    if let Err(e) = state.queue.push(request) {
        tracing::error!(%task_id, error = %e, "could not queue task");
        state.pending.take(&task_id);
    }
}
