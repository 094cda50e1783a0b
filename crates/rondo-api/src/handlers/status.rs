//! /status, /workers, /shutdown handlers.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use rondo_services::StatsSnapshot;

use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub workers: usize,
    pub queue_depth: usize,
    pub pending: usize,
    pub counters: CounterInfo,
    pub uptime_secs: u64,
}

#[derive(Serialize)]
pub struct CounterInfo {
    pub received: u64,
    pub dispatched: u64,
    pub requeued: u64,
    pub completed: u64,
    pub forwarded: u64,
    pub abandoned: u64,
    pub expired: u64,
}

impl From<StatsSnapshot> for CounterInfo {
    fn from(s: StatsSnapshot) -> Self {
        Self {
            received: s.received,
            dispatched: s.dispatched,
            requeued: s.requeued,
            completed: s.completed,
            forwarded: s.forwarded,
            abandoned: s.abandoned,
            expired: s.expired,
        }
    }
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let broker = &state.broker;
    Json(StatusResponse {
        workers: broker.registry.len().await,
        queue_depth: broker.queue.depth(),
        pending: broker.pending.len(),
        counters: broker.stats.snapshot().into(),
        uptime_secs: broker.started_at.elapsed().as_secs(),
    })
}

// ── /workers ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct WorkersResponse {
    pub workers: Vec<WorkerInfo>,
}

#[derive(Serialize)]
pub struct WorkerInfo {
    pub worker_id: String,
    pub addr: String,
    pub connected_secs: u64,
    pub dispatched: u64,
}

pub async fn handle_workers(State(state): State<ApiState>) -> Json<WorkersResponse> {
    let workers = state
        .broker
        .registry
        .handles()
        .await
        .into_iter()
        .map(|h| WorkerInfo {
            worker_id: h.id.to_string(),
            addr: h.peer_addr.to_string(),
            connected_secs: h.registered_at.elapsed().as_secs(),
            dispatched: h.dispatched(),
        })
        .collect();

    Json(WorkersResponse { workers })
}

// ── /shutdown ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ShutdownResponse {
    pub message: String,
}

pub async fn handle_shutdown(State(state): State<ApiState>) -> Json<ShutdownResponse> {
    tracing::info!("shutdown requested via API");
    let _ = state.shutdown_tx.send(());

    Json(ShutdownResponse {
        message: "Shutdown initiated".to_string(),
    })
}
