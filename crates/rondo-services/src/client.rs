//! Client: one connection per task, one reply per connection.

use std::time::Duration;

use futures::future::join_all;
use tokio::net::TcpStream;

use rondo_core::codec::{read_frame, write_frame};
use rondo_core::config::ClientConfig;
use rondo_core::{Envelope, TaskData, TaskRequest, TaskResult, TaskType, WireError};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to connect to broker at {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("no result for task {task_id} within {timeout:?}")]
    Timeout { task_id: String, timeout: Duration },
    #[error("broker closed the connection before task {0} completed")]
    Closed(String),
    #[error("expected result for task {expected}, got {got}")]
    Mismatched { expected: String, got: String },
}

/// Short random task identifier (8 hex digits).
pub fn new_task_id() -> String {
    format!("{:08x}", rand::random::<u32>())
}

#[derive(Debug, Clone)]
pub struct Client {
    broker_addr: String,
    timeout: Duration,
}

impl Client {
    pub fn new(broker_addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            broker_addr: broker_addr.into(),
            timeout,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.broker_addr.clone(), config.timeout())
    }

    pub fn broker_addr(&self) -> &str {
        &self.broker_addr
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Submit a task under a fresh id and wait for its result.
    pub async fn submit(&self, task_type: TaskType, task_data: TaskData) -> Result<TaskResult, ClientError> {
        self.submit_request(TaskRequest {
            task_id: new_task_id(),
            task_type,
            task_data,
        })
        .await
    }

    /// Send one request on a new connection. The timeout covers connect,
    /// send and the wait for the reply; there is no retry.
    pub async fn submit_request(&self, request: TaskRequest) -> Result<TaskResult, ClientError> {
        let task_id = request.task_id.clone();
        match tokio::time::timeout(self.timeout, self.round_trip(request)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(%task_id, timeout_ms = self.timeout.as_millis() as u64, "task timed out");
                Err(ClientError::Timeout {
                    task_id,
                    timeout: self.timeout,
                })
            }
        }
    }

    /// Submit every request on its own connection concurrently. Results come
    /// back in input order.
    pub async fn submit_all(&self, requests: Vec<TaskRequest>) -> Vec<Result<TaskResult, ClientError>> {
        join_all(requests.into_iter().map(|r| self.submit_request(r))).await
    }

    async fn round_trip(&self, request: TaskRequest) -> Result<TaskResult, ClientError> {
        let mut stream = TcpStream::connect(&self.broker_addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: self.broker_addr.clone(),
                source,
            })?;
        crate::net::set_nodelay(&stream);

        let task_id = request.task_id.clone();
        tracing::debug!(%task_id, task_type = %request.task_type, "submitting task");
        write_frame(&mut stream, &Envelope::Task(request)).await?;

        let result: TaskResult = read_frame(&mut stream)
            .await?
            .ok_or_else(|| ClientError::Closed(task_id.clone()))?;
        if result.task_id != task_id {
            return Err(ClientError::Mismatched {
                expected: task_id,
                got: result.task_id,
            });
        }
        Ok(result)
    }
}
