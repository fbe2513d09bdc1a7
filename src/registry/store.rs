//! Subscription registry implementation
//!
//! The central map from subscriber handles to their packet queues. All
//! operations run under one mutex; see the module docs for why.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::packet::Packet;

use super::error::RegistryError;
use super::stream::PacketStream;
use super::SubscriberHandle;

/// Thread-safe map of live subscribers to their bounded packet queues
pub struct SubscriptionRegistry {
    entries: Mutex<HashMap<SubscriberHandle, PacketStream>>,
    queue_capacity: usize,
    running: AtomicBool,
}

impl SubscriptionRegistry {
    /// Create a registry whose streams hold `queue_capacity` packets each
    pub fn new(queue_capacity: usize) -> Result<Self, RegistryError> {
        if queue_capacity == 0 {
            return Err(RegistryError::InvalidCapacity);
        }
        Ok(Self {
            entries: Mutex::new(HashMap::new()),
            queue_capacity,
            running: AtomicBool::new(true),
        })
    }

    /// Register a subscriber
    ///
    /// Idempotent by handle: a second call for a live handle is a no-op,
    /// so at most one stream ever exists per subscriber. Fails once the
    /// registry has shut down.
    pub fn subscribe(&self, handle: SubscriberHandle) -> Result<(), RegistryError> {
        if !self.running.load(Ordering::Acquire) {
            return Err(RegistryError::ShutDown);
        }

        let mut entries = self.entries.lock();
        if entries.contains_key(&handle) {
            return Ok(());
        }
        entries.insert(handle, PacketStream::new(self.queue_capacity)?);

        tracing::info!(%handle, subscribers = entries.len(), "Subscriber registered");
        Ok(())
    }

    /// Remove a subscriber and destroy its stream
    pub fn unsubscribe(&self, handle: SubscriberHandle) {
        let mut entries = self.entries.lock();
        if entries.remove(&handle).is_none() {
            tracing::warn!(%handle, "Unsubscribe for unknown subscriber");
            return;
        }

        tracing::info!(%handle, subscribers = entries.len(), "Subscriber removed");
    }

    /// Duplicate one packet into every subscriber's queue
    ///
    /// Called only by the pump task, so all subscribers observe packets
    /// in the same order. A full stream drops its oldest entries and the
    /// fan-out continues to the remaining subscribers.
    pub fn fan_out(&self, packet: &Packet) {
        let mut entries = self.entries.lock();
        for stream in entries.values_mut() {
            stream.enqueue(packet.clone());
        }
    }

    /// Pop up to `max` packets from one subscriber's stream
    pub fn drain(
        &self,
        handle: SubscriberHandle,
        max: usize,
    ) -> Result<Vec<Packet>, RegistryError> {
        let mut entries = self.entries.lock();
        let stream = entries
            .get_mut(&handle)
            .ok_or(RegistryError::SubscriberNotFound(handle))?;

        let count = max.min(stream.len());
        let mut packets = Vec::with_capacity(count);
        for _ in 0..count {
            match stream.try_dequeue() {
                Some(packet) => packets.push(packet),
                None => break,
            }
        }
        Ok(packets)
    }

    /// Number of live subscribers
    pub fn count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the registry is accepting subscriptions
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop accepting subscriptions and destroy all streams
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        let mut entries = self.entries.lock();
        let dropped = entries.len();
        entries.clear();

        if dropped > 0 {
            tracing::info!(subscribers = dropped, "Registry shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{DataType, StreamIdentifier};
    use bytes::Bytes;

    fn numbered_packet(index: i64) -> Packet {
        Packet {
            identifier: StreamIdentifier::new("UU", "CWU", "HHZ", "01"),
            start_time_micros: index,
            sampling_rate: 100.0,
            number_of_samples: 100,
            data_type: DataType::Integer32,
            data: Bytes::new(),
        }
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            SubscriptionRegistry::new(0),
            Err(RegistryError::InvalidCapacity)
        ));
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let registry = SubscriptionRegistry::new(8).unwrap();
        let handle = SubscriberHandle::new(1);

        registry.subscribe(handle).unwrap();
        registry.subscribe(handle).unwrap();
        assert_eq!(registry.count(), 1);

        // The original stream survives the second subscribe
        registry.fan_out(&numbered_packet(7));
        registry.subscribe(handle).unwrap();
        assert_eq!(registry.drain(handle, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_unsubscribe_unknown_is_noop() {
        let registry = SubscriptionRegistry::new(8).unwrap();
        registry.unsubscribe(SubscriberHandle::new(42));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_fan_out_reaches_every_subscriber() {
        let registry = SubscriptionRegistry::new(8).unwrap();
        let first = SubscriberHandle::new(1);
        let second = SubscriberHandle::new(2);
        registry.subscribe(first).unwrap();
        registry.subscribe(second).unwrap();

        for i in 0..3 {
            registry.fan_out(&numbered_packet(i));
        }

        for handle in [first, second] {
            let drained = registry.drain(handle, 10).unwrap();
            let times: Vec<i64> = drained.iter().map(|p| p.start_time_micros).collect();
            assert_eq!(times, vec![0, 1, 2]);
        }
    }

    #[test]
    fn test_stalled_subscriber_keeps_most_recent() {
        let registry = SubscriptionRegistry::new(4).unwrap();
        let handle = SubscriberHandle::new(1);
        registry.subscribe(handle).unwrap();

        for i in 0..10 {
            registry.fan_out(&numbered_packet(i));
        }

        let drained = registry.drain(handle, 4).unwrap();
        let times: Vec<i64> = drained.iter().map(|p| p.start_time_micros).collect();
        assert_eq!(times, vec![6, 7, 8, 9]);
    }

    #[test]
    fn test_drain_respects_max() {
        let registry = SubscriptionRegistry::new(16).unwrap();
        let handle = SubscriberHandle::new(1);
        registry.subscribe(handle).unwrap();

        for i in 0..10 {
            registry.fan_out(&numbered_packet(i));
        }

        assert_eq!(registry.drain(handle, 3).unwrap().len(), 3);
        assert_eq!(registry.drain(handle, 100).unwrap().len(), 7);
    }

    #[test]
    fn test_drain_unknown_subscriber_fails() {
        let registry = SubscriptionRegistry::new(8).unwrap();
        assert!(matches!(
            registry.drain(SubscriberHandle::new(9), 4),
            Err(RegistryError::SubscriberNotFound(_))
        ));
    }

    #[test]
    fn test_shutdown_clears_and_blocks_subscribes() {
        let registry = SubscriptionRegistry::new(8).unwrap();
        registry.subscribe(SubscriberHandle::new(1)).unwrap();
        registry.subscribe(SubscriberHandle::new(2)).unwrap();

        registry.shutdown();
        assert_eq!(registry.count(), 0);
        assert!(!registry.is_running());
        assert!(matches!(
            registry.subscribe(SubscriberHandle::new(3)),
            Err(RegistryError::ShutDown)
        ));
    }
}
