//! rondo-worker: connects to the broker and executes tasks.

use anyhow::{Context, Result};
use tokio::sync::broadcast;

use rondo_core::config::RondoConfig;
use rondo_services::Worker;

fn print_usage() {
    println!("Usage: rondo-worker [--broker <addr>] [--pool <n>]");
    println!();
    println!("Options:");
    println!("  --broker <addr>   Broker address (default: worker.broker_addr from config)");
    println!("  --pool <n>        Concurrent tasks (default: worker.pool_size from config)");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = RondoConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        RondoConfig::default()
    });

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--broker" => {
                i += 1;
                config.worker.broker_addr = args.get(i).context("--broker requires a value")?.clone();
            }
            "--pool" => {
                i += 1;
                config.worker.pool_size = args
                    .get(i)
                    .context("--pool requires a value")?
                    .parse()
                    .context("--pool must be a number")?;
            }
            "help" | "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let pool_size = config.worker.effective_pool_size();
    let worker = Worker::connect(&config.worker.broker_addr, pool_size).await?;
    tracing::info!(
        worker_id = %worker.id(),
        broker = %config.worker.broker_addr,
        pool_size,
        "registered with broker"
    );

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("shutdown signal received, draining in-flight tasks");
        let _ = shutdown_tx.send(());
    });

    let received = worker.run(shutdown_rx).await?;
    tracing::info!(received, "worker exited");
    Ok(())
}
