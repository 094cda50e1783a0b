use std::collections::HashMap;

use rondo_core::{TaskRequest, TaskType};
use rondo_services::new_task_id;
use rondo_services::processing::sha256_hex;

use crate::*;

/// Two workers, four sequential hash tasks: each client gets its own digest
/// and dispatch alternates between the workers.
#[tokio::test]
async fn test_sequential_tasks_alternate_workers() {
    let broker = start_broker().await.unwrap();
    let w1 = broker.spawn_worker(2).await.unwrap();
    let w2 = broker.spawn_worker(2).await.unwrap();
    assert_eq!(w1.id.to_string(), "worker_1");
    assert_eq!(w2.id.to_string(), "worker_2");

    let client = broker.client();
    let mut served_by = Vec::new();
    for word in ["alpha", "beta", "gamma", "delta"] {
        let result = client.submit(TaskType::Hash, text(word)).await.unwrap();
        assert!(result.is_success(), "{result:?}");
        assert_eq!(result.result["hash"], sha256_hex(word));
        served_by.push(result.worker_id);
    }
    assert_eq!(served_by, ["worker_1", "worker_2", "worker_1", "worker_2"]);

    w1.stop().await.unwrap();
    w2.stop().await.unwrap();
    broker.shutdown().await.unwrap();
}

/// N tasks over M stable workers: every worker gets floor or ceil of N/M.
#[tokio::test]
async fn test_round_robin_fairness() {
    let broker = start_broker().await.unwrap();
    let workers = [
        broker.spawn_worker(4).await.unwrap(),
        broker.spawn_worker(4).await.unwrap(),
        broker.spawn_worker(4).await.unwrap(),
    ];

    let requests = (0..31)
        .map(|i| TaskRequest {
            task_id: format!("fair-{i}"),
            task_type: TaskType::Compute,
            task_data: data(serde_json::json!({ "iterations": i })),
        })
        .collect();
    let results = broker.client().submit_all(requests).await;

    let mut per_worker: HashMap<String, usize> = HashMap::new();
    for r in results {
        let r = r.unwrap();
        assert!(r.is_success());
        *per_worker.entry(r.worker_id).or_default() += 1;
    }
    assert_eq!(per_worker.len(), 3);
    for (worker, n) in &per_worker {
        assert!(*n == 10 || *n == 11, "{worker} got {n} tasks");
    }

    let dispatched: Vec<u64> = broker
        .state
        .registry
        .handles()
        .await
        .iter()
        .map(|h| h.dispatched())
        .collect();
    assert_eq!(dispatched.iter().sum::<u64>(), 31);

    for w in workers {
        w.stop().await.unwrap();
    }
    broker.shutdown().await.unwrap();
}

/// Many concurrent clients each receive exactly their own result.
#[tokio::test]
async fn test_concurrent_clients_get_their_own_results() {
    let broker = start_broker().await.unwrap();
    let w1 = broker.spawn_worker(3).await.unwrap();
    let w2 = broker.spawn_worker(3).await.unwrap();

    let requests: Vec<TaskRequest> = (0..40)
        .map(|i| TaskRequest {
            task_id: new_task_id(),
            task_type: TaskType::Hash,
            task_data: text(&format!("payload-{i}")),
        })
        .collect();
    let expected: Vec<(String, String)> = requests
        .iter()
        .map(|r| {
            let t = r.task_data["text"].as_str().unwrap();
            (r.task_id.clone(), sha256_hex(t))
        })
        .collect();

    let results = broker.client().submit_all(requests).await;
    for (result, (task_id, digest)) in results.into_iter().zip(expected) {
        let result = result.unwrap();
        assert_eq!(result.task_id, task_id);
        assert_eq!(result.result["hash"], digest);
    }

    let state = &broker.state;
    wait_until(Duration::from_secs(2), || async move {
        state.stats.snapshot().forwarded == 40
    })
    .await
    .unwrap();
    assert_eq!(broker.state.stats.snapshot().received, 40);
    assert!(broker.state.pending.is_empty());

    w1.stop().await.unwrap();
    w2.stop().await.unwrap();
    broker.shutdown().await.unwrap();
}

/// With no workers the task waits in the queue, then goes to the first
/// worker that registers.
#[tokio::test]
async fn test_task_waits_for_first_worker() {
    let broker = start_broker().await.unwrap();
    let client = broker.client();
    let submitted = tokio::spawn(async move { client.submit(TaskType::Reverse, text("hello")).await });

    let state = &broker.state;
    wait_until(Duration::from_secs(2), || async move { state.stats.snapshot().received == 1 })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(broker.state.stats.snapshot().dispatched, 0);
    assert!(!submitted.is_finished());

    let worker = broker.spawn_worker(1).await.unwrap();
    let result = submitted.await.unwrap().unwrap();
    assert_eq!(result.result["reversed"], "olleh");
    assert_eq!(result.worker_id, "worker_1");

    worker.stop().await.unwrap();
    broker.shutdown().await.unwrap();
}

/// A disconnected worker is deregistered and never selected again.
#[tokio::test]
async fn test_disconnected_worker_is_not_selected() {
    let broker = start_broker().await.unwrap();
    let w1 = broker.spawn_worker(1).await.unwrap();
    let w2 = broker.spawn_worker(1).await.unwrap();

    w1.stop().await.unwrap();
    broker.wait_for_workers(1).await.unwrap();

    let client = broker.client();
    for i in 0..4 {
        let result = client
            .submit(TaskType::Fibonacci, data(serde_json::json!({ "n": i })))
            .await
            .unwrap();
        assert_eq!(result.worker_id, "worker_2");
    }

    // A newcomer joins the rotation.
    let w3 = broker.spawn_worker(1).await.unwrap();
    let mut seen = Vec::new();
    for _ in 0..2 {
        seen.push(client.submit(TaskType::Hash, text("x")).await.unwrap().worker_id);
    }
    seen.sort();
    assert_eq!(seen, ["worker_2", "worker_3"]);

    assert_eq!(w2.stop().await.unwrap(), 5);
    w3.stop().await.unwrap();
    broker.shutdown().await.unwrap();
}
