//! Proxy-wide packet counters
//!
//! A plain handle of atomics, created once and passed by `Arc` to every
//! component that counts something. Snapshots are taken for periodic
//! logging and for tests; there is no export surface.

pub mod metrics;

pub use metrics::{MetricsSnapshot, ProxyMetrics};
