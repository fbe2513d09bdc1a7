//! Frontend endpoint: publisher-facing ingest server
//!
//! Accepts publish calls and runs one ingest reactor per connection.
//! Admitted packets are normalized and handed to the shared ingress
//! queue; the reactor never sees backpressure from downstream.

pub mod reactor;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::auth::ConnectionSlots;
use crate::config::FrontendConfig;
use crate::detector::DuplicateDetector;
use crate::proxy::IngressQueue;
use crate::server::Endpoint;
use crate::stats::ProxyMetrics;

use reactor::PublishReactor;

/// Publisher-facing server: accept loop plus per-call reactors
pub struct FrontendServer {
    config: FrontendConfig,
    ingress: Arc<IngressQueue>,
    detector: Option<Arc<DuplicateDetector>>,
    metrics: Arc<ProxyMetrics>,
    slots: Arc<ConnectionSlots>,
    next_session_id: AtomicU64,
}

impl FrontendServer {
    /// Create the server around the shared pipeline pieces
    pub fn new(
        config: FrontendConfig,
        ingress: Arc<IngressQueue>,
        detector: Option<Arc<DuplicateDetector>>,
        metrics: Arc<ProxyMetrics>,
    ) -> Self {
        let slots = ConnectionSlots::new(config.maximum_number_of_publishers);
        Self {
            config,
            ingress,
            detector,
            metrics,
            slots,
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Number of currently connected publishers
    pub fn publisher_count(&self) -> usize {
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
                        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(session_id, peer = %peer_addr, "Publisher connected");

                        let reactor = PublishReactor::new(
                            session_id,
                            peer_addr,
                            self.config.clone(),
                            Arc::clone(&self.ingress),
                            self.detector.clone(),
                            Arc::clone(&self.metrics),
                            Arc::clone(&self.slots),
                            shutdown.clone(),
                            secured,
                        );
                        tokio::spawn(reactor.run(stream));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Frontend failed to accept connection");
                    }
                },
            }
        }
        tracing::debug!("Frontend listener stopped");
    }
}
