//! Rondo wire format: the JSON messages that travel between peers.
//!
//! Two message families:
//!
//! - `Envelope`: discriminated by the `type` field. Clients send `TASK`,
//!   workers open with `WORKER_REGISTER` and the broker answers `REGISTERED`.
//!   The broker forwards `TASK` envelopes unchanged to workers.
//! - `TaskResult`: untagged, produced by a worker (or by the broker when it
//!   gives up on a task) and forwarded verbatim to the submitting client.
//!
//! Field names are the protocol. Renaming one is a breaking change.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::codec::WireError;

/// Free-form task arguments / results, always a JSON object on the wire.
pub type TaskData = serde_json::Map<String, serde_json::Value>;

/// `worker_id` used on results the broker produces itself.
pub const BROKER_ORIGIN: &str = "broker";

// ── Worker identity ───────────────────────────────────────────────────────────

/// Broker-assigned worker identity. Rendered as `worker_<n>` on the wire.
///
/// Ordering follows the numeric sequence, which is also registration order.
/// The registry relies on this for a stable round-robin order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkerId(u64);

impl WorkerId {
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    pub fn seq(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker_{}", self.0)
    }
}

impl FromStr for WorkerId {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("worker_")
            .and_then(|n| n.parse().ok())
            .map(WorkerId)
            .ok_or_else(|| WireError::InvalidWorkerId(s.to_string()))
    }
}

impl TryFrom<String> for WorkerId {
    type Error = WireError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WorkerId> for String {
    fn from(id: WorkerId) -> Self {
        id.to_string()
    }
}

// ── Task type ─────────────────────────────────────────────────────────────────

/// Kind of work requested. Unknown names are kept verbatim so workers can
/// still acknowledge them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskType {
    Hash,
    Fibonacci,
    Reverse,
    Compute,
    Other(String),
}

impl TaskType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Hash => "hash",
            Self::Fibonacci => "fibonacci",
            Self::Reverse => "reverse",
            Self::Compute => "compute",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for TaskType {
    fn from(value: &str) -> Self {
        match value {
            "hash" => Self::Hash,
            "fibonacci" => Self::Fibonacci,
            "reverse" => Self::Reverse,
            "compute" => Self::Compute,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for TaskType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "hash" | "fibonacci" | "reverse" | "compute" => Self::from(value.as_str()),
            _ => Self::Other(value),
        }
    }
}

impl From<TaskType> for String {
    fn from(t: TaskType) -> Self {
        match t {
            TaskType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Envelopes ─────────────────────────────────────────────────────────────────

/// A task as submitted by a client and pushed to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Client-generated correlation key. Uniqueness is best-effort.
    pub task_id: String,
    pub task_type: TaskType,
    #[serde(default)]
    pub task_data: TaskData,
}

/// Tagged control envelope. The first frame on every connection is one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Envelope {
    /// Worker → broker, once, right after connecting.
    WorkerRegister,
    /// Broker → worker, reply to `WorkerRegister`.
    Registered { worker_id: WorkerId },
    /// Client → broker, and broker → worker.
    Task(TaskRequest),
}

// ── Results ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Success,
    Error,
}

/// Outcome of one task, correlated to its request by `task_id` only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub result: TaskData,
    /// Identifier of the producer: a worker id, or `"broker"`.
    pub worker_id: String,
    /// Wall-clock seconds spent processing.
    pub processing_time: f64,
}

impl TaskResult {
    /// Error result with `{"error": message}` as its body.
    pub fn failure(task_id: impl Into<String>, worker_id: impl Into<String>, message: impl Into<String>) -> Self {
        let mut result = TaskData::new();
        result.insert("error".into(), serde_json::Value::String(message.into()));
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Error,
            result,
            worker_id: worker_id.into(),
            processing_time: 0.0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }
}
