//! Rondo integration test harness.
//!
//! Every test starts its own broker on an ephemeral loopback port and runs
//! workers and clients in-process against it, so tests never share state
//! and need no external setup:
//!
//!   cargo test --test integration
//!
//! Each test is responsible for shutting down what it starts.

mod dispatch;
mod failures;
mod tasks;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use rondo_core::config::BrokerConfig;
use rondo_core::{TaskData, WorkerId};
use rondo_services::{Broker, BrokerState, Client, Worker, WorkerError};

// ── Harness ───────────────────────────────────────────────────────────────────

/// Broker settings tuned for tests: loopback, ephemeral port, fast polling.
pub fn test_config() -> BrokerConfig {
    BrokerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        api_port: 0,
        poll_interval_ms: 20,
        empty_pool_backoff_ms: 10,
        handshake_timeout_secs: 2,
        ..BrokerConfig::default()
    }
}

pub struct TestBroker {
    pub addr: SocketAddr,
    pub state: BrokerState,
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<Result<()>>,
}

pub async fn start_broker() -> Result<TestBroker> {
    start_broker_with(test_config()).await
}

pub async fn start_broker_with(config: BrokerConfig) -> Result<TestBroker> {
    let broker = Broker::bind(config).await?;
    let addr = broker.local_addr()?;
    let state = broker.state();
    let (shutdown, _) = broadcast::channel(1);
    let task = tokio::spawn(broker.run(shutdown.clone()));
    Ok(TestBroker {
        addr,
        state,
        shutdown,
        task,
    })
}

impl TestBroker {
    pub fn client(&self) -> Client {
        self.client_with_timeout(Duration::from_secs(5))
    }

    pub fn client_with_timeout(&self, timeout: Duration) -> Client {
        Client::new(self.addr.to_string(), timeout)
    }

    /// Connect and register a worker. Registration is complete when this
    /// returns, so workers started one after another get ascending ids.
    pub async fn spawn_worker(&self, pool_size: usize) -> Result<TestWorker> {
        let worker = Worker::connect(&self.addr.to_string(), pool_size).await?;
        let id = worker.id();
        let (shutdown, rx) = broadcast::channel(1);
        let task = tokio::spawn(worker.run(rx));
        Ok(TestWorker { id, shutdown, task })
    }

    /// Wait until exactly `n` workers are registered.
    pub async fn wait_for_workers(&self, n: usize) -> Result<()> {
        wait_until(Duration::from_secs(3), || async move { self.state.registry.len().await == n })
            .await
            .with_context(|| format!("expected {n} registered workers"))
    }

    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(());
        self.task.await.context("broker task panicked")?
    }
}

pub struct TestWorker {
    pub id: WorkerId,
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<Result<u64, WorkerError>>,
}

impl TestWorker {
    /// Stop the worker and return how many tasks it received.
    pub async fn stop(self) -> Result<u64> {
        let _ = self.shutdown.send(());
        Ok(self.task.await.context("worker task panicked")??)
    }
}

/// Poll `check` every 10 ms until it holds or `limit` passes.
pub async fn wait_until<F, Fut>(limit: Duration, mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check().await {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("condition not met within {limit:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn data(value: serde_json::Value) -> TaskData {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("task data must be an object, got {other}"),
    }
}

pub fn text(s: &str) -> TaskData {
    data(serde_json::json!({ "text": s }))
}
