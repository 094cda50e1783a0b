//! rondo-ctl: submit tasks to a rondo broker and inspect its status.

mod cmd;

use anyhow::{Context, Result};
use serde_json::json;

use rondo_core::config::RondoConfig;
use rondo_core::TaskType;
use rondo_services::Client;

use cmd::tasks::data;

fn print_usage() {
    println!("Usage: rondo-ctl [--broker <addr>] [--timeout <secs>] [--port <port>] <command>");
    println!();
    println!("Tasks:");
    println!("  hash <text>                 SHA-256 of text");
    println!("  fibonacci [n]               First n Fibonacci numbers (default 10)");
    println!("  reverse <text>              Reverse text");
    println!("  compute [iterations]        Sum of squares below iterations (default 1000)");
    println!("  submit <task_type> <json>   Any task type with a JSON object as data");
    println!("  batch <count>               Send count hash tasks in parallel");
    println!();
    println!("Broker:");
    println!("  status                      Queue, worker and counter summary");
    println!("  workers                     List registered workers");
    println!("  shutdown                    Stop the broker");
    println!();
    println!("Options:");
    println!("  --broker <addr>    Broker task address (default: client.broker_addr from config)");
    println!("  --timeout <secs>   Result timeout (default: client.timeout_secs from config)");
    println!("  --port <port>      Status API port (default: broker.api_port from config)");
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = RondoConfig::load().unwrap_or_default();
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut port = config.broker.api_port;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                port = args
                    .get(i)
                    .context("--port requires a value")?
                    .parse()
                    .context("--port must be a number")?;
            }
            "--broker" => {
                i += 1;
                config.client.broker_addr = args.get(i).context("--broker requires a value")?.clone();
            }
            "--timeout" => {
                i += 1;
                config.client.timeout_secs = args
                    .get(i)
                    .context("--timeout requires a value")?
                    .parse()
                    .context("--timeout must be a number of seconds")?;
            }
            other => remaining.push(other),
        }
        i += 1;
    }

    let client = Client::from_config(&config.client);

    match remaining.as_slice() {
        ["hash", text] => {
            cmd::tasks::cmd_submit(&client, TaskType::Hash, data(json!({ "text": text }))).await
        }
        ["fibonacci"] => cmd::tasks::cmd_submit(&client, TaskType::Fibonacci, data(json!({}))).await,
        ["fibonacci", n] => {
            let n: u64 = n.parse().context("n must be a non-negative number")?;
            cmd::tasks::cmd_submit(&client, TaskType::Fibonacci, data(json!({ "n": n }))).await
        }
        ["reverse", text] => {
            cmd::tasks::cmd_submit(&client, TaskType::Reverse, data(json!({ "text": text }))).await
        }
        ["compute"] => cmd::tasks::cmd_submit(&client, TaskType::Compute, data(json!({}))).await,
        ["compute", iterations] => {
            let iterations: u64 = iterations
                .parse()
                .context("iterations must be a non-negative number")?;
            cmd::tasks::cmd_submit(
                &client,
                TaskType::Compute,
                data(json!({ "iterations": iterations })),
            )
            .await
        }
        ["submit", task_type, json] => cmd::tasks::cmd_submit_raw(&client, task_type, json).await,
        ["batch", count] => {
            let count: usize = count.parse().context("count must be a number")?;
            cmd::tasks::cmd_batch(&client, count).await
        }
        ["status"] | [] => cmd::status::cmd_status(port).await,
        ["workers"] => cmd::status::cmd_workers(port).await,
        ["shutdown"] => cmd::status::cmd_shutdown(port).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
