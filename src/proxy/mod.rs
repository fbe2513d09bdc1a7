//! Proxy core: ingress queue, pump task, and component lifecycle
//!
//! The core owns the shared ingress queue, the registry, and both
//! listeners. One pump task is the queue's only consumer; it pops
//! admitted packets and fans each one out to every subscriber queue, so
//! all subscribers observe the same packet order.
//!
//! ```text
//! publishers ──> frontend reactors ──> IngressQueue ──> pump ──┐
//!                                                              │ fan_out
//!                            subscriber queues <───────────────┘
//!                                   │
//! subscribers <── backend reactors ─┘
//! ```

pub mod ingress;

pub use ingress::IngressQueue;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backend::BackendServer;
use crate::config::Config;
use crate::detector::DuplicateDetector;
use crate::error::Result;
use crate::frontend::FrontendServer;
use crate::registry::SubscriptionRegistry;
use crate::server::Endpoint;
use crate::stats::ProxyMetrics;

/// Sleep between ingress polls when the queue is empty
const PUMP_POLL_INTERVAL: Duration = Duration::from_millis(15);

/// Pause after closing the frontend, before stopping the pump
const STOP_INGRESS_GRACE: Duration = Duration::from_millis(10);

/// Pause after stopping the pump, letting subscribers drain
const STOP_DRAIN_GRACE: Duration = Duration::from_millis(25);

/// The fan-out proxy: both endpoints plus the pipeline between them
pub struct Proxy {
    config: Config,
    metrics: Arc<ProxyMetrics>,
    registry: Arc<SubscriptionRegistry>,
    ingress: Arc<IngressQueue>,
    detector: Option<Arc<DuplicateDetector>>,

    running: Arc<AtomicBool>,
    frontend_shutdown: Option<watch::Sender<bool>>,
    backend_shutdown: Option<watch::Sender<bool>>,
    pump_task: Option<JoinHandle<()>>,
    frontend_task: Option<JoinHandle<()>>,
    backend_task: Option<JoinHandle<()>>,
    frontend_addr: Option<SocketAddr>,
    backend_addr: Option<SocketAddr>,
}

impl Proxy {
    /// Build a proxy from a validated configuration
    pub fn new(config: Config, metrics: Arc<ProxyMetrics>) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(SubscriptionRegistry::new(config.backend.queue_capacity)?);
        let ingress = Arc::new(IngressQueue::new(config.proxy.queue_capacity));
        let detector = match &config.duplicate_detector {
            Some(section) => Some(Arc::new(DuplicateDetector::new(&section.options())?)),
            None => None,
        };

        Ok(Self {
            config,
            metrics,
            registry,
            ingress,
            detector,
            running: Arc::new(AtomicBool::new(false)),
            frontend_shutdown: None,
            backend_shutdown: None,
            pump_task: None,
            frontend_task: None,
            backend_task: None,
            frontend_addr: None,
            backend_addr: None,
        })
    }

    /// Bind both endpoints and launch the pipeline
    ///
    /// The backend comes up before the frontend so eager subscribers do
    /// not miss packets the frontend has already begun accepting.
    pub async fn start(&mut self) -> Result<()> {
        let backend_endpoint = Endpoint::bind(
            "backend",
            &self.config.backend.bind_address(),
            self.config.backend.server_key_path.as_deref(),
            self.config.backend.server_certificate_path.as_deref(),
        )
        .await?;
        let frontend_endpoint = Endpoint::bind(
            "frontend",
            &self.config.frontend.bind_address(),
            self.config.frontend.server_key_path.as_deref(),
            self.config.frontend.server_certificate_path.as_deref(),
        )
        .await?;
        self.backend_addr = Some(backend_endpoint.local_addr());
        self.frontend_addr = Some(frontend_endpoint.local_addr());

        let (frontend_tx, frontend_rx) = watch::channel(false);
        let (backend_tx, backend_rx) = watch::channel(false);
        self.frontend_shutdown = Some(frontend_tx);
        self.backend_shutdown = Some(backend_tx);

        self.running.store(true, Ordering::Release);
        self.pump_task = Some(self.spawn_pump());

        let backend = Arc::new(BackendServer::new(
            self.config.backend.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.metrics),
        ));
        self.backend_task = Some(tokio::spawn(backend.run(backend_endpoint, backend_rx)));

        let frontend = Arc::new(FrontendServer::new(
            self.config.frontend.clone(),
            Arc::clone(&self.ingress),
            self.detector.clone(),
            Arc::clone(&self.metrics),
        ));
        self.frontend_task = Some(tokio::spawn(frontend.run(frontend_endpoint, frontend_rx)));

        tracing::info!("Proxy started");
        Ok(())
    }

    /// Stop everything, in an order that minimizes lost packets
    ///
    /// The frontend closes first so producers can fail over; the pump
    /// then drains what is already queued into subscriber queues before
    /// the backend closes.
    pub async fn stop(&mut self) {
        tracing::info!("Stopping proxy");

        if let Some(tx) = self.frontend_shutdown.take() {
            tracing::debug!("Proxy canceling calls on frontend");
            let _ = tx.send(true);
        }
        if let Some(task) = self.frontend_task.take() {
            let _ = task.await;
        }
        tokio::time::sleep(STOP_INGRESS_GRACE).await;

        // The flag must be cleared before joining the pump, or the join
        // would never return.
        self.running.store(false, Ordering::Release);
        if let Some(task) = self.pump_task.take() {
            let _ = task.await;
        }

        tokio::time::sleep(STOP_DRAIN_GRACE).await;

        if let Some(tx) = self.backend_shutdown.take() {
            tracing::debug!("Proxy canceling calls on backend");
            let _ = tx.send(true);
        }
        if let Some(task) = self.backend_task.take() {
            let _ = task.await;
        }

        self.registry.shutdown();
        tracing::info!("Proxy stopped");
    }

    fn spawn_pump(&self) -> JoinHandle<()> {
        let ingress = Arc::clone(&self.ingress);
        let registry = Arc::clone(&self.registry);
        let metrics = Arc::clone(&self.metrics);
        let running = Arc::clone(&self.running);

        tokio::spawn(async move {
            while running.load(Ordering::Acquire) {
                match ingress.try_pop() {
                    Some(packet) => {
                        registry.fan_out(&packet);
                        metrics.record_fanned_out();
                    }
                    None => tokio::time::sleep(PUMP_POLL_INTERVAL).await,
                }
            }
            tracing::debug!("Pump task stopped");
        })
    }

    /// The subscription registry
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// The metrics handle this proxy was built with
    pub fn metrics(&self) -> &Arc<ProxyMetrics> {
        &self.metrics
    }

    /// Bound frontend address, once started
    pub fn frontend_addr(&self) -> Option<SocketAddr> {
        self.frontend_addr
    }

    /// Bound backend address, once started
    pub fn backend_addr(&self) -> Option<SocketAddr> {
        self.backend_addr
    }
}
