//! Worker: registers with the broker, then executes pushed tasks on a
//! fixed-size pool.
//!
//! Reading never waits for execution: each inbound task is spawned at once
//! and waits for a pool permit on its own. Results share the single broker
//! connection through a write gate, so frames are never interleaved.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Mutex, Semaphore};
use tokio::task::JoinSet;

use rondo_core::codec::{encode_frame, read_frame, write_frame};
use rondo_core::{Envelope, TaskRequest, TaskResult, TaskStatus, WireError, WorkerId};

use crate::processing;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("failed to connect to broker at {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("broker closed the connection during registration")]
    ClosedDuringHandshake,
    #[error("expected REGISTERED from broker, got {0:?}")]
    UnexpectedReply(Box<Envelope>),
}

/// Single-writer gate over the broker connection.
type SharedWriter = Arc<Mutex<OwnedWriteHalf>>;

/// Occupancy of a worker's task pool. Cheap to clone.
#[derive(Clone, Default)]
pub struct PoolGauge {
    inner: Arc<GaugeCounts>,
}

#[derive(Default)]
struct GaugeCounts {
    busy: AtomicUsize,
    peak: AtomicUsize,
}

impl PoolGauge {
    /// Slots currently holding a task.
    pub fn busy(&self) -> usize {
        self.inner.busy.load(Ordering::Relaxed)
    }

    /// Highest `busy` seen since the worker started.
    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::Relaxed)
    }

    fn enter(&self) -> BusySlot {
        let now = self.inner.busy.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner.peak.fetch_max(now, Ordering::Relaxed);
        BusySlot(self.clone())
    }
}

struct BusySlot(PoolGauge);

impl Drop for BusySlot {
    fn drop(&mut self) {
        self.0.inner.busy.fetch_sub(1, Ordering::Relaxed);
    }
}

pub struct Worker {
    id: WorkerId,
    reader: OwnedReadHalf,
    writer: SharedWriter,
    pool_size: usize,
    gauge: PoolGauge,
}

impl Worker {
    /// Connect, send WORKER_REGISTER, and wait for the assigned id.
    pub async fn connect(broker_addr: &str, pool_size: usize) -> Result<Self, WorkerError> {
        let mut stream = TcpStream::connect(broker_addr)
            .await
            .map_err(|source| WorkerError::Connect {
                addr: broker_addr.to_string(),
                source,
            })?;
        crate::net::set_nodelay(&stream);

        write_frame(&mut stream, &Envelope::WorkerRegister).await?;
        let id = match read_frame::<Envelope, _>(&mut stream).await? {
            Some(Envelope::Registered { worker_id }) => worker_id,
            Some(other) => return Err(WorkerError::UnexpectedReply(Box::new(other))),
            None => return Err(WorkerError::ClosedDuringHandshake),
        };

        let (reader, writer) = stream.into_split();
        Ok(Self {
            id,
            reader,
            writer: Arc::new(Mutex::new(writer)),
            pool_size: pool_size.max(1),
            gauge: PoolGauge::default(),
        })
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn gauge(&self) -> PoolGauge {
        self.gauge.clone()
    }

    /// Process tasks until the broker disconnects or `shutdown` fires.
    /// In-flight tasks are drained before returning. Returns the number of
    /// tasks received.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<u64, WorkerError> {
        let permits = Arc::new(Semaphore::new(self.pool_size));
        let mut in_flight = JoinSet::new();
        let mut received = 0u64;

        tracing::info!(worker_id = %self.id, pool_size = self.pool_size, "worker ready");

        loop {
            let frame = tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!(worker_id = %self.id, "worker shutting down");
                    break;
                }
                frame = read_frame::<Envelope, _>(&mut self.reader) => frame,
            };

            match frame {
                Ok(Some(Envelope::Task(request))) => {
                    received += 1;
                    in_flight.spawn(run_task(
                        request,
                        self.id,
                        permits.clone(),
                        self.gauge.clone(),
                        self.writer.clone(),
                    ));
                }
                Ok(Some(other)) => {
                    tracing::warn!(worker_id = %self.id, envelope = ?other, "ignoring unexpected message");
                }
                Ok(None) => {
                    tracing::info!(worker_id = %self.id, "broker closed connection");
                    break;
                }
                Err(e) => {
                    tracing::warn!(worker_id = %self.id, error = %e, "failed to read from broker");
                    break;
                }
            }

            // Reap finished tasks so the set does not grow without bound.
            while in_flight.try_join_next().is_some() {}
        }

        while in_flight.join_next().await.is_some() {}
        tracing::info!(
            worker_id = %self.id,
            received,
            peak_busy = self.gauge.peak(),
            "worker stopped"
        );
        Ok(received)
    }
}

async fn run_task(
    request: TaskRequest,
    worker_id: WorkerId,
    permits: Arc<Semaphore>,
    gauge: PoolGauge,
    writer: SharedWriter,
) {
    let Ok(_permit) = permits.acquire_owned().await else {
        return;
    };
    let _slot = gauge.enter();

    let TaskRequest {
        task_id,
        task_type,
        task_data,
    } = request;
    tracing::info!(%task_id, %task_type, %worker_id, "processing task");

    let start = Instant::now();
    let outcome = tokio::task::spawn_blocking(move || processing::process(&task_type, &task_data)).await;
    let processing_time = start.elapsed().as_secs_f64();

    let mut result = match outcome {
        Ok(Ok(body)) => TaskResult {
            task_id,
            status: TaskStatus::Success,
            result: body,
            worker_id: worker_id.to_string(),
            processing_time,
        },
        Ok(Err(e)) => TaskResult {
            processing_time,
            ..TaskResult::failure(task_id, worker_id.to_string(), e.to_string())
        },
        Err(e) => TaskResult {
            processing_time,
            ..TaskResult::failure(task_id, worker_id.to_string(), format!("task panicked: {e}"))
        },
    };

    let frame = match encode_result(&mut result) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(task_id = %result.task_id, error = %e, "failed to encode result");
            return;
        }
    };

    let mut writer = writer.lock().await;
    let sent = match writer.write_all(&frame).await {
        Ok(()) => writer.flush().await,
        Err(e) => Err(e),
    };
    match sent {
        Ok(()) => tracing::info!(
            task_id = %result.task_id,
            status = ?result.status,
            elapsed_ms = (processing_time * 1000.0) as u64,
            "task finished"
        ),
        Err(e) => tracing::warn!(task_id = %result.task_id, error = %e, "failed to send result"),
    }
}

/// Encode `result` as one frame. A body too large for a frame is replaced
/// by an error result so the client still hears back.
fn encode_result(result: &mut TaskResult) -> Result<Bytes, WireError> {
    match encode_frame(&*result) {
        Err(WireError::TooLarge { length, limit }) => {
            tracing::warn!(task_id = %result.task_id, length, limit, "result exceeds frame limit");
            *result = TaskResult {
                processing_time: result.processing_time,
                ..TaskResult::failure(
                    result.task_id.clone(),
                    result.worker_id.clone(),
                    format!("result too large: {length} bytes exceeds the {limit} byte frame limit"),
                )
            };
            encode_frame(&*result)
        }
        other => other,
    }
}
