//! HTTP API handlers: exposes broker state as JSON.

pub mod status;

use tokio::sync::broadcast;

use rondo_services::BrokerState;

#[derive(Clone)]
pub struct ApiState {
    pub broker: BrokerState,
    /// Shutdown broadcast sender: signals graceful broker shutdown.
    pub shutdown_tx: broadcast::Sender<()>,
}

pub use status::{handle_shutdown, handle_status, handle_workers};
