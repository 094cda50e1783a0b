//! rondo-services: broker state, dispatch, task execution, and the client.
//!
//! The broker side is `broker::Broker`, which composes the worker registry,
//! the pending-response table, the task queue, and the dispatcher. The worker
//! side is `worker::Worker`. `client::Client` submits tasks.

pub mod broker;
pub mod client;
pub mod dispatcher;
pub mod net;
pub mod pending;
pub mod processing;
pub mod queue;
pub mod registry;
pub mod stats;
pub mod worker;

pub use broker::{Broker, BrokerState};
pub use client::{new_task_id, Client, ClientError};
pub use dispatcher::{DispatchOutcome, DispatchSettings, Dispatcher, RoundRobinCursor};
pub use pending::{PendingClient, PendingResponses};
pub use processing::{process, TaskError};
pub use queue::{task_queue, QueueClosed, QueuedTask, TaskQueue, TaskQueueReceiver};
pub use registry::{Membership, WorkerHandle, WorkerRegistry};
pub use stats::{BrokerStats, StatsSnapshot};
pub use worker::{PoolGauge, Worker, WorkerError};
