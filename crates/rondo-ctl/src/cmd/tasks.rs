//! Task submission commands. These talk to the broker's task port directly,
//! one connection per task.

use std::collections::BTreeMap;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};

use rondo_core::{TaskData, TaskRequest, TaskResult, TaskType};
use rondo_services::{new_task_id, Client};

pub async fn cmd_submit(client: &Client, task_type: TaskType, task_data: TaskData) -> Result<()> {
    let task_id = new_task_id();
    println!("Submitting task {} ({}) to {}", task_id, task_type, client.broker_addr());

    let result = client
        .submit_request(TaskRequest {
            task_id,
            task_type,
            task_data,
        })
        .await?;
    print_result(&result)
}

/// `submit <task_type> <json>`: arbitrary type, data given as a JSON object.
pub async fn cmd_submit_raw(client: &Client, task_type: &str, data: &str) -> Result<()> {
    let task_data = match serde_json::from_str::<Value>(data).context("task data must be JSON")? {
        Value::Object(map) => map,
        other => bail!("task data must be a JSON object, got {}", other),
    };
    cmd_submit(client, TaskType::from(task_type), task_data).await
}

/// `batch <count>`: `count` hash tasks in parallel, each on its own connection.
pub async fn cmd_batch(client: &Client, count: usize) -> Result<()> {
    println!("Sending {} tasks in parallel...", count);

    let requests = (0..count)
        .map(|i| TaskRequest {
            task_id: new_task_id(),
            task_type: TaskType::Hash,
            task_data: data(json!({ "text": format!("task_{}", i) })),
        })
        .collect();

    let start = Instant::now();
    let results = client.submit_all(requests).await;
    let elapsed = start.elapsed().as_secs_f64();

    let mut per_worker: BTreeMap<String, usize> = BTreeMap::new();
    let mut failed = 0usize;
    for r in &results {
        match r {
            Ok(result) if result.is_success() => {
                *per_worker.entry(result.worker_id.clone()).or_default() += 1;
            }
            Ok(result) => {
                failed += 1;
                eprintln!("  task {} failed: {}", result.task_id, Value::Object(result.result.clone()));
            }
            Err(e) => {
                failed += 1;
                eprintln!("  {}", e);
            }
        }
    }

    println!();
    println!("═══════════════════════════════════════");
    println!("  {} tasks in {:.2}s", count, elapsed);
    if count > 0 {
        println!("  Average   : {:.3}s per task", elapsed / count as f64);
    }
    println!("  Succeeded : {}", count - failed);
    println!("  Failed    : {}", failed);
    println!("═══════════════════════════════════════");
    for (worker, n) in &per_worker {
        println!("  {:<12} {}", worker, n);
    }

    if failed > 0 {
        bail!("{} of {} tasks failed", failed, count);
    }
    Ok(())
}

fn print_result(result: &TaskResult) -> Result<()> {
    println!("═══════════════════════════════════════");
    println!("  Task {} : {:?}", result.task_id, result.status);
    println!("═══════════════════════════════════════");
    println!("  worker  : {}", result.worker_id);
    println!("  elapsed : {:.4}s", result.processing_time);
    println!(
        "  result  : {}",
        serde_json::to_string_pretty(&result.result).context("failed to render result")?
    );
    Ok(())
}

pub fn data(value: Value) -> TaskData {
    match value {
        Value::Object(map) => map,
        _ => TaskData::new(),
    }
}
