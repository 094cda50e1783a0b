//! Broker status, worker list, and shutdown commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json, post_json};

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StatusResponse {
    workers: usize,
    queue_depth: usize,
    pending: usize,
    counters: CounterInfo,
    uptime_secs: u64,
}

#[derive(Deserialize)]
struct CounterInfo {
    received: u64,
    dispatched: u64,
    requeued: u64,
    completed: u64,
    forwarded: u64,
    abandoned: u64,
    expired: u64,
}

#[derive(Deserialize)]
struct WorkersResponse {
    workers: Vec<WorkerInfo>,
}

#[derive(Deserialize)]
struct WorkerInfo {
    worker_id: String,
    addr: String,
    connected_secs: u64,
    dispatched: u64,
}

#[derive(Deserialize)]
struct ShutdownResponse {
    message: String,
}

// ── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;
    let c = &resp.counters;

    println!("═══════════════════════════════════════");
    println!("  Rondo Broker Status");
    println!("═══════════════════════════════════════");
    println!("  Uptime           : {}s", resp.uptime_secs);
    println!("  Workers          : {}", resp.workers);
    println!("  Queue depth      : {}", resp.queue_depth);
    println!("  Awaiting results : {}", resp.pending);
    println!();
    println!("  Received   : {}", c.received);
    println!("  Dispatched : {}", c.dispatched);
    println!("  Requeued   : {}", c.requeued);
    println!("  Completed  : {}", c.completed);
    println!("  Forwarded  : {}", c.forwarded);
    println!("  Abandoned  : {}", c.abandoned);
    println!("  Expired    : {}", c.expired);

    Ok(())
}

pub async fn cmd_workers(port: u16) -> Result<()> {
    let resp: WorkersResponse = get_json(&format!("{}/workers", base_url(port))).await?;

    if resp.workers.is_empty() {
        println!("No workers registered.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Registered Workers ({})", resp.workers.len());
    println!("═══════════════════════════════════════");

    for w in &resp.workers {
        println!("  ┌─ {}", w.worker_id);
        println!("  │  addr       : {}", w.addr);
        println!("  │  connected  : {}s", w.connected_secs);
        println!("  └─ dispatched : {}", w.dispatched);
    }

    Ok(())
}

pub async fn cmd_shutdown(port: u16) -> Result<()> {
    let resp: ShutdownResponse = post_json(&format!("{}/shutdown", base_url(port))).await?;
    println!("{}", resp.message);
    Ok(())
}
