//! Duplicate packet detection
//!
//! Publishers are sometimes scaled up before their predecessor is purged,
//! which produces transient duplicate streams at the frontend. The
//! detector remembers a bounded window of recent packet fingerprints and
//! rejects exact retransmits without comparing payload bytes.
//!
//! A fingerprint hashes the stream identifier, start time, sample count,
//! and sampling rate. The window is bounded by size (oldest fingerprint
//! evicted first), by age, or both; at least one bound must be configured.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::packet::Packet;

/// Duplicate detector configuration
#[derive(Debug, Clone, Default)]
pub struct DetectorOptions {
    circular_buffer_size: Option<usize>,
    circular_buffer_duration: Option<Duration>,
}

impl DetectorOptions {
    /// Bound the window to the most recent `size` fingerprints
    pub fn circular_buffer_size(mut self, size: usize) -> Self {
        self.circular_buffer_size = Some(size);
        self
    }

    /// Drop fingerprints older than `duration`
    pub fn circular_buffer_duration(mut self, duration: Duration) -> Self {
        self.circular_buffer_duration = Some(duration);
        self
    }
}

/// Membership test over a bounded window of recent packet fingerprints
pub struct DuplicateDetector {
    size_bound: Option<usize>,
    duration_bound: Option<Duration>,
    inner: Mutex<Window>,
}

#[derive(Default)]
struct Window {
    /// Fingerprints in insertion order, with insertion timestamps
    order: VecDeque<(u64, Instant)>,
    /// Membership index over `order`
    seen: HashSet<u64>,
}

impl DuplicateDetector {
    /// Create a detector; at least one bound must be configured
    pub fn new(options: &DetectorOptions) -> Result<Self> {
        if options.circular_buffer_size.is_none() && options.circular_buffer_duration.is_none() {
            return Err(Error::Config(
                "duplicate detector requires a circular buffer size or duration".to_string(),
            ));
        }
        if options.circular_buffer_size == Some(0) {
            return Err(Error::Config(
                "duplicate detector circular buffer size must be positive".to_string(),
            ));
        }
        Ok(Self {
            size_bound: options.circular_buffer_size,
            duration_bound: options.circular_buffer_duration,
            inner: Mutex::new(Window::default()),
        })
    }

    /// Admit or reject a packet
    ///
    /// Returns false if the packet's fingerprint is already in the
    /// retention window; otherwise records it and returns true.
    pub fn allow(&self, packet: &Packet) -> bool {
        let fingerprint = fingerprint(packet);
        let mut window = self.inner.lock();

        if let Some(duration) = self.duration_bound {
            let cutoff = Instant::now();
            while let Some(&(old, inserted_at)) = window.order.front() {
                if cutoff.duration_since(inserted_at) > duration {
                    window.order.pop_front();
                    window.seen.remove(&old);
                } else {
                    break;
                }
            }
        }

        if window.seen.contains(&fingerprint) {
            return false;
        }

        window.seen.insert(fingerprint);
        window.order.push_back((fingerprint, Instant::now()));

        if let Some(size) = self.size_bound {
            while window.order.len() > size {
                if let Some((old, _)) = window.order.pop_front() {
                    window.seen.remove(&old);
                }
            }
        }

        true
    }

    /// Number of fingerprints currently retained
    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    /// Whether the window is empty
    pub fn is_empty(&self) -> bool {
        self.inner.lock().order.is_empty()
    }
}

/// Identity-and-timing fingerprint of a packet
///
/// The payload is deliberately excluded: an exact retransmit carries the
/// same identifier, start time, sample count, and rate, and hashing those
/// is much cheaper than hashing the sample bytes.
fn fingerprint(packet: &Packet) -> u64 {
    let mut hasher = DefaultHasher::new();
    packet.identifier.network.hash(&mut hasher);
    packet.identifier.station.hash(&mut hasher);
    packet.identifier.channel.hash(&mut hasher);
    packet.identifier.location_code.hash(&mut hasher);
    packet.start_time_micros.hash(&mut hasher);
    packet.number_of_samples.hash(&mut hasher);
    packet.sampling_rate.to_bits().hash(&mut hasher);
    hasher.finish()
}
