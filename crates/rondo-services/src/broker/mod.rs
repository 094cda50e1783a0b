//! Broker: listens for clients and workers and runs the dispatcher.
//!
//! `Broker::bind` creates all shared state explicitly; nothing is global.
//! `Broker::run` spawns the dispatcher (and the optional pending-response
//! expiry sweep) and then accepts connections until shutdown.

mod connection;
mod worker_link;

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use rondo_core::config::BrokerConfig;

use crate::dispatcher::{DispatchSettings, Dispatcher};
use crate::pending::PendingResponses;
use crate::queue::{task_queue, TaskQueue, TaskQueueReceiver};
use crate::registry::WorkerRegistry;
use crate::stats::BrokerStats;

/// State shared by every connection handler, the dispatcher, and the API.
#[derive(Clone)]
pub struct BrokerState {
    pub registry: WorkerRegistry,
    pub pending: PendingResponses<TcpStream>,
    pub queue: TaskQueue,
    pub stats: BrokerStats,
    pub started_at: Instant,
    /// Failed sends before a task is abandoned. 0 = never.
    pub max_dispatch_attempts: u32,
}

pub struct Broker {
    listener: TcpListener,
    state: BrokerState,
    queue_rx: TaskQueueReceiver,
    config: BrokerConfig,
}

impl Broker {
    /// Bind the listening socket and create empty broker state.
    pub async fn bind(config: BrokerConfig) -> Result<Self> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind broker on {addr}"))?;

        let (queue, queue_rx) = task_queue();
        let state = BrokerState {
            registry: WorkerRegistry::new(),
            pending: PendingResponses::new(),
            queue,
            stats: BrokerStats::new(),
            started_at: Instant::now(),
            max_dispatch_attempts: config.max_dispatch_attempts,
        };

        Ok(Self {
            listener,
            state,
            queue_rx,
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("listener has no local address")
    }

    /// Handle on the shared state, for the status API and tests.
    pub fn state(&self) -> BrokerState {
        self.state.clone()
    }

    /// Accept connections until `shutdown` fires.
    pub async fn run(self, shutdown: broadcast::Sender<()>) -> Result<()> {
        let Broker {
            listener,
            state,
            queue_rx,
            config,
        } = self;

        let dispatcher = Dispatcher::new(
            state.registry.clone(),
            state.pending.clone(),
            state.queue.clone(),
            queue_rx,
            state.stats.clone(),
            DispatchSettings::from(&config),
        );
        let dispatcher_task = tokio::spawn(dispatcher.run(shutdown.subscribe()));

        if let Some(ttl) = config.pending_ttl() {
            tokio::spawn(expiry_loop(state.clone(), ttl, shutdown.subscribe()));
        }

        let handshake_timeout = config.handshake_timeout();
        let mut shutdown_rx = shutdown.subscribe();

        tracing::info!(addr = %listener.local_addr()?, "broker listening");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("broker listener shutting down");
                    break;
                }

                accepted = listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    crate::net::set_nodelay(&stream);
                    tracing::debug!(%peer_addr, "connection accepted");
                    tokio::spawn(connection::handle_connection(
                        state.clone(),
                        stream,
                        peer_addr,
                        handshake_timeout,
                    ));
                }
            }
        }

        match dispatcher_task.await {
            Ok(r) => r,
            Err(e) => Err(e).context("dispatcher task failed"),
        }
    }
}

/// Periodically drop pending responses whose client has waited longer than `ttl`.
pub async fn expiry_loop(state: BrokerState, ttl: Duration, mut shutdown: broadcast::Receiver<()>) {
    let period = (ttl / 4).max(Duration::from_millis(100));
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = shutdown.recv() => return,
            _ = interval.tick() => {
                let expired = state.pending.expire_older_than(ttl);
                if !expired.is_empty() {
                    state.stats.record_expired(expired.len());
                    tracing::info!(
                        count = expired.len(),
                        ttl_secs = ttl.as_secs(),
                        "expired pending responses"
                    );
                }
            }
        }
    }
}
