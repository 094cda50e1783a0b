//! Pending-response table: client connections waiting for their result.
//!
//! Keyed by `task_id`. An entry is consumed at most once: `deliver` removes
//! it before writing, so a duplicate or late result finds nothing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use rondo_core::codec::write_frame;
use rondo_core::{TaskResult, WireError};

/// A client connection parked until its task completes.
#[derive(Debug)]
pub struct PendingClient<C> {
    pub conn: C,
    pub submitted_at: Instant,
}

/// task_id → waiting client. Generic over the connection so tests can use
/// in-memory pipes.
pub struct PendingResponses<C = TcpStream> {
    entries: Arc<DashMap<String, PendingClient<C>>>,
}

impl<C> Clone for PendingResponses<C> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<C> Default for PendingResponses<C> {
    fn default() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }
}

impl<C> PendingResponses<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a connection. Returns the entry it replaced, if the client
    /// reused a task_id that is still pending.
    pub fn insert(&self, task_id: String, conn: C) -> Option<PendingClient<C>> {
        self.entries.insert(
            task_id,
            PendingClient {
                conn,
                submitted_at: Instant::now(),
            },
        )
    }

    pub fn take(&self, task_id: &str) -> Option<PendingClient<C>> {
        self.entries.remove(task_id).map(|(_, v)| v)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.entries.contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry older than `ttl`. Returns the removed task ids;
    /// their connections are dropped (closed) here.
    pub fn expire_older_than(&self, ttl: Duration) -> Vec<String> {
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().submitted_at.elapsed() >= ttl)
            .map(|e| e.key().clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|task_id| {
                self.entries
                    .remove_if(&task_id, |_, v| v.submitted_at.elapsed() >= ttl)
                    .map(|(k, _)| k)
            })
            .collect()
    }
}

impl<C> PendingResponses<C>
where
    C: AsyncWrite + Unpin,
{
    /// Forward a result to its waiting client and close the connection.
    ///
    /// `Ok(false)` means no client was waiting for this task_id.
    pub async fn deliver(&self, result: &TaskResult) -> Result<bool, WireError> {
        let Some(mut pending) = self.take(&result.task_id) else {
            return Ok(false);
        };
        write_frame(&mut pending.conn, result).await?;
        let _ = pending.conn.shutdown().await;
        Ok(true)
    }
}
