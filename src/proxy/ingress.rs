//! Shared ingress queue
//!
//! All frontend reactors push into one bounded queue; the pump task is
//! its only consumer. Producers never block and never see backpressure:
//! when the queue is full they evict the oldest packets to make room.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_queue::ArrayQueue;

use crate::packet::Packet;

/// Bounded multi-producer queue between ingest and fan-out
pub struct IngressQueue {
    queue: ArrayQueue<Packet>,
    dropped: AtomicU64,
}

impl IngressQueue {
    /// Create a queue holding at most `capacity` packets
    ///
    /// Capacity is validated at configuration load; it is always >= 1
    /// here.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue a packet, evicting the oldest entries if the queue is full
    pub fn push(&self, packet: Packet) {
        let mut packet = packet;
        loop {
            match self.queue.push(packet) {
                Ok(()) => return,
                Err(rejected) => {
                    packet = rejected;
                    match self.queue.pop() {
                        Some(_) => {
                            // Overflow is expected under load; one warning,
                            // then counted silently.
                            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed);
                            if dropped == 0 {
                                tracing::warn!(
                                    "Ingress queue full; dropping oldest packets"
                                );
                            }
                        }
                        None => {
                            tracing::warn!("Failed to pop element from full ingress queue");
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Dequeue the oldest packet, if any
    pub fn try_pop(&self) -> Option<Packet> {
        self.queue.pop()
    }

    /// Number of queued packets
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Packets evicted by overflow so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
