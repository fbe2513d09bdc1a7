//! Per-subscriber packet queue
//!
//! A slow subscriber must not stall the proxy or its peers. Each
//! subscriber gets a bounded FIFO; when it overflows, the oldest packets
//! are evicted so the wire-ready buffer stays fresh and memory per
//! subscriber stays at `capacity × packet size`.

use std::collections::VecDeque;

use crate::packet::Packet;

use super::error::RegistryError;

/// Bounded FIFO of packets with drop-oldest overflow
///
/// Not internally synchronized; the registry mutex serializes access.
/// Lives exactly as long as its subscriber's call.
#[derive(Debug)]
pub struct PacketStream {
    packets: VecDeque<Packet>,
    capacity: usize,
}

impl PacketStream {
    /// Create a stream holding at most `capacity` packets
    pub fn new(capacity: usize) -> Result<Self, RegistryError> {
        if capacity == 0 {
            return Err(RegistryError::InvalidCapacity);
        }
        Ok(Self {
            packets: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    /// Append a packet, evicting the oldest entries if the queue is full
    ///
    /// Never blocks the caller. If a pop unexpectedly fails while making
    /// room, the drain loop stops with a warning rather than spinning.
    pub fn enqueue(&mut self, packet: Packet) {
        while self.packets.len() >= self.capacity {
            if self.packets.pop_front().is_none() {
                tracing::warn!("failed to pop element from full packet stream");
                break;
            }
        }
        self.packets.push_back(packet);
    }

    /// Remove and return the oldest packet, if any
    pub fn try_dequeue(&mut self) -> Option<Packet> {
        self.packets.pop_front()
    }

    /// Number of queued packets
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
