//! Subscription registry for packet fan-out
//!
//! The registry maps live subscribers to their bounded packet queues and
//! duplicates every admitted packet into each of them.
//!
//! # Architecture
//!
//! ```text
//!                    Arc<SubscriptionRegistry>
//!               ┌───────────────────────────────┐
//!               │ entries: Mutex<HashMap<       │
//!               │   SubscriberHandle,           │
//!               │   PacketStream {              │
//!               │     bounded FIFO, drop-oldest │
//!               │   }                           │
//!               │ >>                            │
//!               └───────────────┬───────────────┘
//!                               │
//!          ┌────────────────────┼────────────────────┐
//!          │                    │                    │
//!          ▼                    ▼                    ▼
//!     [Pump task]         [Subscriber]          [Subscriber]
//!     fan_out(p)          drain(h, max)         drain(h, max)
//! ```
//!
//! # Locking
//!
//! One mutex guards the whole map. Fan-out is the hot path and touches
//! every entry on every packet, so per-entry locks would buy nothing
//! while complicating shutdown; a single short critical section keeps
//! enqueue and drain serialized per subscriber. This is a scaling
//! ceiling: at fan-out widths far beyond tens of subscribers, the next
//! step would be a copy-on-write snapshot of the entry set.
//!
//! # Cheap fan-out copies
//!
//! `Packet` payloads are `bytes::Bytes`, so duplicating a packet into
//! every subscriber queue reference-counts one allocation rather than
//! copying sample data.

pub mod error;
pub mod store;
pub mod stream;

pub use error::RegistryError;
pub use store::SubscriptionRegistry;
pub use stream::PacketStream;

/// Identity of one live subscribe call
///
/// Handles are allocated from a monotonically increasing counter per
/// subscribe call and never reused within a process run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberHandle(u64);

impl SubscriberHandle {
    /// Wrap a raw handle value
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw handle value
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriberHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "subscriber-{}", self.0)
    }
}
