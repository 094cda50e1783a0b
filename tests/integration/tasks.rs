use rondo_core::{TaskStatus, TaskType};

use crate::*;

#[tokio::test]
async fn test_every_task_type_end_to_end() {
    let broker = start_broker().await.unwrap();
    let worker = broker.spawn_worker(4).await.unwrap();
    let client = broker.client();

    let r = client.submit(TaskType::Hash, text("abc")).await.unwrap();
    assert_eq!(
        r.result["hash"],
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );

    let r = client
        .submit(TaskType::Fibonacci, data(serde_json::json!({ "n": 5 })))
        .await
        .unwrap();
    assert_eq!(r.result["sequence"], serde_json::json!([0, 1, 1, 2, 3]));

    let r = client.submit(TaskType::Reverse, text("hello")).await.unwrap();
    assert_eq!(r.result["reversed"], "olleh");

    let r = client
        .submit(TaskType::Compute, data(serde_json::json!({ "iterations": 3 })))
        .await
        .unwrap();
    assert_eq!(r.result["result"], 5);

    let r = client
        .submit(
            TaskType::from("thumbnail"),
            data(serde_json::json!({ "width": 64 })),
        )
        .await
        .unwrap();
    assert_eq!(r.status, TaskStatus::Success);
    assert_eq!(r.result["message"], "Task processed");
    assert_eq!(r.result["data"]["width"], 64);
    assert_eq!(r.worker_id, "worker_1");

    assert_eq!(worker.stop().await.unwrap(), 5);
    broker.shutdown().await.unwrap();
}

/// Integers past 64 bits survive the broker hop without rounding.
#[tokio::test]
async fn test_large_numeric_results_are_exact() {
    let broker = start_broker().await.unwrap();
    let worker = broker.spawn_worker(1).await.unwrap();
    let client = broker.client();

    let r = client
        .submit(TaskType::Fibonacci, data(serde_json::json!({ "n": 100 })))
        .await
        .unwrap();
    assert_eq!(r.status, TaskStatus::Success);
    assert_eq!(r.result["sequence"][99].to_string(), "218922995834555169026");

    let r = client
        .submit(TaskType::Compute, data(serde_json::json!({ "iterations": 5_000_000 })))
        .await
        .unwrap();
    assert_eq!(r.result["result"].to_string(), "41666654166667500000");

    worker.stop().await.unwrap();
    broker.shutdown().await.unwrap();
}

/// Bad task input comes back as an error result, not a dropped task.
#[tokio::test]
async fn test_task_errors_are_reported_to_client() {
    let broker = start_broker().await.unwrap();
    let worker = broker.spawn_worker(1).await.unwrap();
    let client = broker.client();

    let r = client
        .submit(TaskType::Fibonacci, data(serde_json::json!({ "n": "lots" })))
        .await
        .unwrap();
    assert_eq!(r.status, TaskStatus::Error);
    assert!(r.result["error"].as_str().unwrap().contains("\"n\""));

    let r = client
        .submit(TaskType::Reverse, data(serde_json::json!({ "text": ["not", "text"] })))
        .await
        .unwrap();
    assert_eq!(r.status, TaskStatus::Error);

    // The worker is still healthy afterwards.
    let r = client.submit(TaskType::Reverse, text("ok")).await.unwrap();
    assert_eq!(r.result["reversed"], "ko");

    worker.stop().await.unwrap();
    broker.shutdown().await.unwrap();
}

/// Tasks beyond the pool size queue up on the worker and all complete.
#[tokio::test]
async fn test_worker_pool_runs_more_tasks_than_slots() {
    let broker = start_broker().await.unwrap();
    let worker = broker.spawn_worker(2).await.unwrap();

    let requests = (0..12)
        .map(|i| rondo_core::TaskRequest {
            task_id: format!("pool-{i}"),
            task_type: TaskType::Compute,
            task_data: data(serde_json::json!({ "iterations": 100_000 })),
        })
        .collect();
    let results = broker.client().submit_all(requests).await;

    for (i, r) in results.into_iter().enumerate() {
        let r = r.unwrap();
        assert_eq!(r.task_id, format!("pool-{i}"));
        assert_eq!(r.result["result"], 333_328_333_350_000u64);
    }

    assert_eq!(worker.stop().await.unwrap(), 12);
    broker.shutdown().await.unwrap();
}
