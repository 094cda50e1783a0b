//! Socket options shared by broker, worker and client connections.

use std::io;
use std::net::SocketAddr;

use tokio::net::TcpStream;

/// Disable Nagle's algorithm on `stream`. A failure is logged and the
/// connection kept; returns whether the option took effect.
pub fn set_nodelay(stream: &TcpStream) -> bool {
    report_nodelay(stream.set_nodelay(true), stream.peer_addr().ok())
}

fn report_nodelay(result: io::Result<()>, peer: Option<SocketAddr>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(peer = ?peer, error = %e, "set_nodelay failed");
            false
        }
    }
}
