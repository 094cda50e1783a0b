//! Broker-wide counters, exposed through the status API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct BrokerStats {
    inner: Arc<Counters>,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    dispatched: AtomicU64,
    requeued: AtomicU64,
    completed: AtomicU64,
    forwarded: AtomicU64,
    abandoned: AtomicU64,
    expired: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Tasks accepted from clients.
    pub received: u64,
    /// Successful hand-offs to a worker (re-dispatches included).
    pub dispatched: u64,
    /// Times a task went back to the tail of the queue.
    pub requeued: u64,
    /// Results read from workers.
    pub completed: u64,
    /// Results that reached a waiting client.
    pub forwarded: u64,
    /// Tasks given up after too many failed sends.
    pub abandoned: u64,
    /// Pending responses dropped by the expiry sweep.
    pub expired: u64,
}

impl BrokerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.inner.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatched(&self) {
        self.inner.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_requeued(&self) {
        self.inner.requeued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.inner.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forwarded(&self) {
        self.inner.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned(&self) {
        self.inner.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired(&self, n: usize) {
        self.inner.expired.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let c = &self.inner;
        StatsSnapshot {
            received: c.received.load(Ordering::Relaxed),
            dispatched: c.dispatched.load(Ordering::Relaxed),
            requeued: c.requeued.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            forwarded: c.forwarded.load(Ordering::Relaxed),
            abandoned: c.abandoned.load(Ordering::Relaxed),
            expired: c.expired.load(Ordering::Relaxed),
        }
    }
}
