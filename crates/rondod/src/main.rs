//! rondod: task broker daemon.

use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast;

use rondo_core::config::RondoConfig;
use rondo_services::{Broker, BrokerState};

const STATS_INTERVAL: Duration = Duration::from_secs(30);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = RondoConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = RondoConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        RondoConfig::default()
    });
    let api_port = config.broker.api_port;
    tracing::info!(
        addr = %config.broker.listen_addr(),
        max_dispatch_attempts = config.broker.max_dispatch_attempts,
        pending_ttl_secs = config.broker.pending_ttl_secs,
        "rondod starting"
    );

    let broker = Broker::bind(config.broker).await?;
    let state = broker.state();

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    if api_port != 0 {
        let api_state = rondo_api::ApiState {
            broker: state.clone(),
            shutdown_tx: shutdown_tx.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = rondo_api::serve(api_state, api_port).await {
                tracing::error!(error = %e, "status API failed");
            }
        });
    }

    let stats_printer = tokio::spawn(print_stats(state, STATS_INTERVAL, shutdown_tx.subscribe()));
    let mut shutdown_rx = shutdown_tx.subscribe();
    let mut broker_task = tokio::spawn(broker.run(shutdown_tx));

    // ── Wait for exit ────────────────────────────────────────────────────────

    tokio::select! {
        _ = shutdown_rx.recv() => {
            tracing::info!("shutting down");
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut broker_task).await.is_err() {
                tracing::warn!("broker did not stop in time");
            }
        }
        r = &mut broker_task => match r {
            Ok(Ok(())) => tracing::info!("broker stopped"),
            Ok(Err(e)) => tracing::error!(error = %e, "broker exited"),
            Err(e)     => tracing::error!(error = %e, "broker task panicked"),
        },
    }
    stats_printer.abort();

    Ok(())
}

/// Log counters periodically while anything is changing.
async fn print_stats(state: BrokerState, period: Duration, mut shutdown: broadcast::Receiver<()>) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;
    let mut last = state.stats.snapshot();

    loop {
        tokio::select! {
            _ = shutdown.recv() => return,
            _ = interval.tick() => {}
        }
        let now = state.stats.snapshot();
        if now == last {
            continue;
        }
        let workers = state.registry.len().await;
        tracing::info!(
            workers,
            queue_depth = state.queue.depth(),
            pending = state.pending.len(),
            received = now.received,
            dispatched = now.dispatched,
            completed = now.completed,
            abandoned = now.abandoned,
            "broker stats"
        );
        last = now;
    }
}
