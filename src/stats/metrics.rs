//! Packet flow counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the packet pipeline
///
/// All counters are monotonically increasing over the process lifetime.
#[derive(Debug, Default)]
pub struct ProxyMetrics {
    /// Packets read from publishers, valid or not
    packets_received: AtomicU64,
    /// Packets that failed validation or normalization
    packets_rejected: AtomicU64,
    /// Packets dropped as duplicates
    packets_duplicate: AtomicU64,
    /// Packets fanned out to subscriber queues
    packets_fanned_out: AtomicU64,
    /// Packets written to subscriber connections
    packets_sent: AtomicU64,
}

impl ProxyMetrics {
    /// Create a zeroed metrics handle
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.packets_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.packets_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fanned_out(&self) {
        self.packets_fanned_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_rejected: self.packets_rejected.load(Ordering::Relaxed),
            packets_duplicate: self.packets_duplicate.load(Ordering::Relaxed),
            packets_fanned_out: self.packets_fanned_out.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub packets_received: u64,
    pub packets_rejected: u64,
    pub packets_duplicate: u64,
    pub packets_fanned_out: u64,
    pub packets_sent: u64,
}
