//! Backend endpoint: subscriber-facing egress server
//!
//! Accepts subscribe calls, allocates an opaque handle per call, and runs
//! one write reactor per connection. Each reactor drains its registry
//! queue onto the wire at its subscriber's pace.

pub mod reactor;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::auth::ConnectionSlots;
use crate::config::BackendConfig;
use crate::registry::{SubscriberHandle, SubscriptionRegistry};
use crate::server::Endpoint;
use crate::stats::ProxyMetrics;

use reactor::SubscribeReactor;

/// Maximum inbound frame size on the backend; subscribers only ever send
/// a hello frame.
const MAX_INBOUND_FRAME_SIZE: usize = 8192;

/// Subscriber-facing server: accept loop plus per-call reactors
pub struct BackendServer {
    config: BackendConfig,
    registry: Arc<SubscriptionRegistry>,
    metrics: Arc<ProxyMetrics>,
    slots: Arc<ConnectionSlots>,
    next_handle: AtomicU64,
}

impl BackendServer {
    /// Create the server around the shared registry
    pub fn new(
        config: BackendConfig,
        registry: Arc<SubscriptionRegistry>,
        metrics: Arc<ProxyMetrics>,
    ) -> Self {
        let slots = ConnectionSlots::new(config.maximum_number_of_subscribers);
        Self {
            config,
            registry,
            metrics,
            slots,
            next_handle: AtomicU64::new(1),
        }
    }

    /// Number of currently connected subscribers
    pub fn subscriber_count(&self) -> usize {
        self.slots.active()
    }

    /// Run the accept loop until shutdown is signalled
    pub async fn run(self: Arc<Self>, endpoint: Endpoint, mut shutdown: watch::Receiver<bool>) {
        let secured = endpoint.is_secured();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = endpoint.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        let handle =
                            SubscriberHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
                        tracing::debug!(%handle, peer = %peer_addr, "Subscriber connected");

                        let reactor = SubscribeReactor::new(
                            handle,
                            peer_addr,
                            self.config.clone(),
                            Arc::clone(&self.registry),
                            Arc::clone(&self.metrics),
                            Arc::clone(&self.slots),
                            shutdown.clone(),
                            secured,
                        );
                        tokio::spawn(reactor.run(stream));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Backend failed to accept connection");
                    }
                },
            }
        }
        tracing::debug!("Backend listener stopped");
    }
}
