use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use rondo_core::codec::{read_frame, write_frame};
use rondo_core::{Envelope, TaskResult, TaskStatus, TaskType};
use rondo_services::ClientError;

use crate::*;

/// True once the peer has closed `stream` (EOF or reset).
async fn closed_by_peer(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 64];
    matches!(
        tokio::time::timeout(Duration::from_secs(3), stream.read(&mut buf)).await,
        Ok(Ok(0)) | Ok(Err(_))
    )
}

/// A malformed first message closes only that connection.
#[tokio::test]
async fn test_malformed_messages_are_isolated() {
    let broker = start_broker().await.unwrap();
    let worker = broker.spawn_worker(1).await.unwrap();

    let mut garbage = TcpStream::connect(broker.addr).await.unwrap();
    garbage.write_all(&8u32.to_be_bytes()).await.unwrap();
    garbage.write_all(b"not json").await.unwrap();
    assert!(closed_by_peer(&mut garbage).await);

    let mut empty = TcpStream::connect(broker.addr).await.unwrap();
    empty.write_all(&0u32.to_be_bytes()).await.unwrap();
    assert!(closed_by_peer(&mut empty).await);

    let mut huge = TcpStream::connect(broker.addr).await.unwrap();
    huge.write_all(&u32::MAX.to_be_bytes()).await.unwrap();
    assert!(closed_by_peer(&mut huge).await);

    let mut impostor = TcpStream::connect(broker.addr).await.unwrap();
    write_frame(
        &mut impostor,
        &Envelope::Registered {
            worker_id: worker.id,
        },
    )
    .await
    .unwrap();
    assert!(closed_by_peer(&mut impostor).await);

    let r = broker.client().submit(TaskType::Hash, text("still fine")).await.unwrap();
    assert!(r.is_success());
    assert_eq!(broker.state.registry.len().await, 1);

    worker.stop().await.unwrap();
    broker.shutdown().await.unwrap();
}

/// A connection that never says anything is dropped after the handshake timeout.
#[tokio::test]
async fn test_silent_connection_times_out() {
    let config = BrokerConfig {
        handshake_timeout_secs: 1,
        ..test_config()
    };
    let broker = start_broker_with(config).await.unwrap();

    let mut silent = TcpStream::connect(broker.addr).await.unwrap();
    assert!(closed_by_peer(&mut silent).await);
    assert!(broker.state.registry.is_empty().await);

    broker.shutdown().await.unwrap();
}

/// Results for unknown or already-answered tasks are dropped; the client
/// sees exactly one reply.
#[tokio::test]
async fn test_duplicate_and_unknown_results_are_dropped() {
    let broker = start_broker().await.unwrap();

    let mut fake = TcpStream::connect(broker.addr).await.unwrap();
    write_frame(&mut fake, &Envelope::WorkerRegister).await.unwrap();
    let reply: Envelope = read_frame(&mut fake).await.unwrap().unwrap();
    let Envelope::Registered { worker_id } = reply else {
        panic!("expected REGISTERED, got {reply:?}");
    };

    let client = broker.client();
    let submitted = tokio::spawn(async move { client.submit(TaskType::Hash, text("once")).await });

    let Some(Envelope::Task(request)) = read_frame::<Envelope, _>(&mut fake).await.unwrap() else {
        panic!("expected a task");
    };
    let answer = TaskResult {
        task_id: request.task_id.clone(),
        status: TaskStatus::Success,
        result: data(serde_json::json!({ "hash": "first" })),
        worker_id: worker_id.to_string(),
        processing_time: 0.0,
    };
    let stray = TaskResult {
        task_id: "nobody-asked".into(),
        ..answer.clone()
    };
    let second = TaskResult {
        result: data(serde_json::json!({ "hash": "second" })),
        ..answer.clone()
    };
    write_frame(&mut fake, &stray).await.unwrap();
    write_frame(&mut fake, &answer).await.unwrap();

    let got = submitted.await.unwrap().unwrap();
    assert_eq!(got.task_id, request.task_id);
    assert_eq!(got.result["hash"], "first");

    write_frame(&mut fake, &second).await.unwrap();
    let state = &broker.state;
    wait_until(Duration::from_secs(2), || async move {
        let stats = state.stats.snapshot();
        stats.completed == 3 && stats.forwarded == 1
    })
    .await
    .unwrap();
    assert!(broker.state.pending.is_empty());

    drop(fake);
    broker.wait_for_workers(0).await.unwrap();
    broker.shutdown().await.unwrap();
}

/// A client timeout is local: the broker still holds the pending entry.
#[tokio::test]
async fn test_client_timeout_leaves_pending_entry() {
    let broker = start_broker().await.unwrap();
    let client = broker.client_with_timeout(Duration::from_millis(150));

    let err = client.submit(TaskType::Compute, TaskData::new()).await.unwrap_err();
    assert!(matches!(err, ClientError::Timeout { .. }), "{err}");
    assert_eq!(broker.state.pending.len(), 1);
    assert_eq!(broker.state.stats.snapshot().dispatched, 0);

    broker.shutdown().await.unwrap();
}

/// With a TTL configured, abandoned pending entries are swept and their
/// connections closed.
#[tokio::test]
async fn test_pending_entries_expire() {
    let config = BrokerConfig {
        pending_ttl_secs: 1,
        ..test_config()
    };
    let broker = start_broker_with(config).await.unwrap();
    let client = broker.client();

    let err = client.submit(TaskType::Hash, text("nobody home")).await.unwrap_err();
    assert!(matches!(err, ClientError::Closed(_)), "{err}");
    assert!(broker.state.pending.is_empty());
    let state = &broker.state;
    wait_until(Duration::from_secs(1), || async move {
        state.stats.snapshot().expired == 1
    })
    .await
    .unwrap();

    broker.shutdown().await.unwrap();
}

/// Stopping a worker lets its in-flight tasks finish and reach the client.
#[tokio::test]
async fn test_worker_drains_on_shutdown() {
    let broker = start_broker().await.unwrap();
    let worker = broker.spawn_worker(1).await.unwrap();
    let client = broker.client();

    let submitted = tokio::spawn(async move {
        client
            .submit(
                TaskType::Compute,
                data(serde_json::json!({ "iterations": 1_000_000 })),
            )
            .await
    });
    let state = &broker.state;
    wait_until(Duration::from_secs(2), || async move {
        state.stats.snapshot().dispatched == 1
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(worker.stop().await.unwrap(), 1);
    let r = submitted.await.unwrap().unwrap();
    assert!(r.is_success());

    broker.wait_for_workers(0).await.unwrap();
    broker.shutdown().await.unwrap();
}
