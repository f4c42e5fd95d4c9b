//! Link Metrics
//!
//! Lock-free counters updated by the worker thread and readable from any
//! thread through `LinkMetrics::snapshot`.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared metrics handle; clones observe the same counters
#[derive(Clone, Default)]
pub struct LinkMetrics {
    inner: Arc<Counters>,
}

#[derive(Default)]
struct Counters {
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
    packets_received: AtomicU64,
    bytes_received: AtomicU64,
    connect_attempts: AtomicU64,
    connect_failures: AtomicU64,
    connections: AtomicU64,
    disconnects: AtomicU64,
    errors: AtomicU64,

    /// Error type tracking
    error_types: RwLock<HashMap<&'static str, u64>>,

    /// Last operation timestamps
    last_send: RwLock<Option<Instant>>,
    last_receive: RwLock<Option<Instant>>,
}

/// Point-in-time copy of the link counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub packets_received: u64,
    pub bytes_received: u64,
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub connections: u64,
    pub disconnects: u64,
    pub errors: u64,
    pub error_types: HashMap<&'static str, u64>,
    pub last_activity: Option<Instant>,
}

impl LinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one packet written to the socket
    #[inline]
    pub fn record_send(&self, bytes: usize) {
        self.inner.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.inner
            .bytes_sent
            .fetch_add(bytes as u64, Ordering::Relaxed);
        *self.inner.last_send.write() = Some(Instant::now());
    }

    /// Record one packet surfaced to subscribers
    #[inline]
    pub fn record_receive(&self, bytes: usize) {
        self.inner.packets_received.fetch_add(1, Ordering::Relaxed);
        self.inner
            .bytes_received
            .fetch_add(bytes as u64, Ordering::Relaxed);
        *self.inner.last_receive.write() = Some(Instant::now());
    }

    pub fn record_connect_attempt(&self) {
        self.inner.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect_failure(&self) {
        self.inner.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connected(&self) {
        self.inner.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disconnect(&self) {
        self.inner.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an error under its category
    pub fn record_error(&self, category: &'static str) {
        self.inner.errors.fetch_add(1, Ordering::Relaxed);
        *self.inner.error_types.write().entry(category).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let last_send = *self.inner.last_send.read();
        let last_receive = *self.inner.last_receive.read();

        MetricsSnapshot {
            packets_sent: self.inner.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.inner.bytes_sent.load(Ordering::Relaxed),
            packets_received: self.inner.packets_received.load(Ordering::Relaxed),
            bytes_received: self.inner.bytes_received.load(Ordering::Relaxed),
            connect_attempts: self.inner.connect_attempts.load(Ordering::Relaxed),
            connect_failures: self.inner.connect_failures.load(Ordering::Relaxed),
            connections: self.inner.connections.load(Ordering::Relaxed),
            disconnects: self.inner.disconnects.load(Ordering::Relaxed),
            errors: self.inner.errors.load(Ordering::Relaxed),
            error_types: self.inner.error_types.read().clone(),
            last_activity: last_send.max(last_receive),
        }
    }
}

impl std::fmt::Debug for LinkMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.snapshot().fmt(f)
    }
}
