//! Per-subscriber egress state machine
//!
//! One reactor drives one subscribe call:
//!
//! ```text
//! Init ──auth/cap ok──> Pumping ──server stop──> Shutdown ──> Done
//!   │                     │  │
//!   │                     │  └──write failed────> Failed ───> Done
//!   └──reject──> Failed   └──peer vanished─────> Cancelled ─> Done
//! ```
//!
//! The reactor keeps a small local write queue refilled from the
//! registry and interleaves network writes with polling of that queue.
//! Polling with a short sleep is deliberate: a condition variable per
//! subscriber would have to be signalled under the registry mutex for
//! every packet to every subscriber, which buys nothing at fan-out
//! widths of tens of subscribers and complicates shutdown. The sleep
//! interval bounds idle tail latency and is configurable.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;

use crate::auth::{self, ConnectionSlots, SlotGuard};
use crate::config::BackendConfig;
use crate::packet::Packet;
use crate::registry::{RegistryError, SubscriberHandle, SubscriptionRegistry};
use crate::server::tls::MaybeTlsStream;
use crate::stats::ProxyMetrics;
use crate::wire::{Frame, FrameReader, FrameWriter, Role, Status, StatusCode, WireError};

use super::MAX_INBOUND_FRAME_SIZE;

/// Subscribe call lifecycle
#[derive(Debug)]
enum SubscribeState {
    /// Validate the hello: token, role, subscriber cap; register
    Init,
    /// Drain the registry queue onto the wire
    Pumping,
    /// Server-initiated stop; `clean` means no write was interrupted and
    /// a terminal OK can still be framed
    Shutdown { clean: bool },
    /// Peer vanished; nothing to send
    Cancelled,
    /// Reject or unexpected failure: send the terminal status
    Failed(Status),
    /// Terminal
    Done,
}

/// State machine for one subscribe call
pub(crate) struct SubscribeReactor {
    handle: SubscriberHandle,
    peer_addr: SocketAddr,
    config: BackendConfig,
    registry: Arc<SubscriptionRegistry>,
    metrics: Arc<ProxyMetrics>,
    slots: Arc<ConnectionSlots>,
    shutdown: watch::Receiver<bool>,
    secured: bool,

    registered: bool,
    packets_sent: u64,
}

impl SubscribeReactor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        handle: SubscriberHandle,
        peer_addr: SocketAddr,
        config: BackendConfig,
        registry: Arc<SubscriptionRegistry>,
        metrics: Arc<ProxyMetrics>,
        slots: Arc<ConnectionSlots>,
        shutdown: watch::Receiver<bool>,
        secured: bool,
    ) -> Self {
        Self {
            handle,
            peer_addr,
            config,
            registry,
            metrics,
            slots,
            shutdown,
            secured,
            registered: false,
            packets_sent: 0,
        }
    }

    /// Drive the call to completion
    pub(crate) async fn run(mut self, stream: MaybeTlsStream) {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = FrameReader::new(read_half, MAX_INBOUND_FRAME_SIZE);
        let mut writer = FrameWriter::new(write_half);

        let mut slot: Option<SlotGuard> = None;

        let mut state = SubscribeState::Init;
        loop {
            state = match state {
                SubscribeState::Init => self.init(&mut reader, &mut slot).await,
                SubscribeState::Pumping => self.pump(&mut reader, &mut writer).await,
                SubscribeState::Shutdown { clean } => {
                    if clean {
                        if let Err(e) = writer.write_status(Status::ok()).await {
                            tracing::debug!(
                                handle = %self.handle,
                                error = %e,
                                "Failed to send terminal status"
                            );
                        }
                    }
                    let _ = writer.shutdown().await;
                    SubscribeState::Done
                }
                SubscribeState::Cancelled => {
                    tracing::info!(
                        handle = %self.handle,
                        peer = %self.peer_addr,
                        "Subscribe call canceled by peer"
                    );
                    SubscribeState::Done
                }
                SubscribeState::Failed(status) => {
                    if let Err(e) = writer.write_status(status).await {
                        tracing::debug!(
                            handle = %self.handle,
                            error = %e,
                            "Failed to send terminal status"
                        );
                    }
                    let _ = writer.shutdown().await;
                    SubscribeState::Done
                }
                SubscribeState::Done => break,
            };
        }

        if self.registered {
            self.registry.unsubscribe(self.handle);
        }
        drop(slot);
        tracing::info!(
            handle = %self.handle,
            peer = %self.peer_addr,
            packets_sent = self.packets_sent,
            "Subscribe call completed"
        );
    }

    /// Token check, role check, subscriber cap, registration
    async fn init<R>(
        &mut self,
        reader: &mut FrameReader<R>,
        slot: &mut Option<SlotGuard>,
    ) -> SubscribeState
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let hello = match reader.read_frame().await {
            Ok(Some(Frame::Hello(hello))) => hello,
            Ok(Some(_)) => {
                return SubscribeState::Failed(Status::new(
                    StatusCode::InvalidArgument,
                    "expected hello frame",
                ))
            }
            Ok(None) | Err(_) => return SubscribeState::Cancelled,
        };

        if hello.role != Role::Subscribe {
            return SubscribeState::Failed(Status::new(
                StatusCode::InvalidArgument,
                "connection is not a subscribe call",
            ));
        }

        if self.secured {
            if let Some(token) = &self.config.access_token {
                if !auth::validate_token(&hello.metadata, token) {
                    tracing::info!(peer = %self.peer_addr, "Backend rejected subscriber token");
                    return SubscribeState::Failed(Status::new(
                        StatusCode::Unauthenticated,
                        "subscriber must provide access token in x-custom-auth-token header",
                    ));
                }
                tracing::info!(peer = %self.peer_addr, "Backend validated subscriber token");
            }
        }

        match self.slots.try_acquire() {
            Some(guard) => *slot = Some(guard),
            None => {
                tracing::warn!(
                    peer = %self.peer_addr,
                    "Backend rejecting subscriber because max number of subscribers hit"
                );
                return SubscribeState::Failed(Status::new(
                    StatusCode::ResourceExhausted,
                    "max subscribers hit - try again later",
                ));
            }
        }

        if *self.shutdown.borrow() {
            tracing::warn!(handle = %self.handle, "Immediately closing subscribe call");
            return SubscribeState::Shutdown { clean: true };
        }

        match self.registry.subscribe(self.handle) {
            Ok(()) => {}
            Err(RegistryError::ShutDown) => return SubscribeState::Shutdown { clean: true },
            Err(e) => {
                tracing::warn!(handle = %self.handle, error = %e, "Failed to register subscriber");
                return SubscribeState::Failed(Status::new(
                    StatusCode::Unknown,
                    "failed to register subscriber",
                ));
            }
        }
        self.registered = true;

        tracing::info!(
            handle = %self.handle,
            peer = %self.peer_addr,
            subscribers = self.slots.active(),
            "Subscriber admitted"
        );
        SubscribeState::Pumping
    }

    /// Write loop; returns the next terminal-ish state
    async fn pump<R, W>(
        &mut self,
        reader: &mut FrameReader<R>,
        writer: &mut FrameWriter<W>,
    ) -> SubscribeState
    where
        R: tokio::io::AsyncRead + Unpin,
        W: tokio::io::AsyncWrite + Unpin,
    {
        let max_write_queue_size = self.config.maximum_write_queue_size;
        let mut write_queue: VecDeque<Packet> = VecDeque::with_capacity(max_write_queue_size);

        loop {
            if write_queue.is_empty() {
                match self.registry.drain(self.handle, max_write_queue_size) {
                    Ok(batch) => {
                        for packet in batch {
                            if write_queue.len() >= max_write_queue_size {
                                write_queue.pop_front();
                            }
                            write_queue.push_back(packet);
                        }
                    }
                    // The entry is destroyed only by registry shutdown
                    Err(_) => return SubscribeState::Shutdown { clean: true },
                }
            }

            let next = write_queue.front().cloned();
            if let Some(packet) = next {
                let frame = Frame::Packet(packet);
                tokio::select! {
                    biased;
                    _ = self.shutdown.changed() => {
                        // The write future may have been dropped mid-frame;
                        // do not frame a terminal status on top of it.
                        return SubscribeState::Shutdown { clean: false };
                    }
                    result = writer.write_frame(&frame) => match result {
                        Ok(()) => {
                            write_queue.pop_front();
                            self.packets_sent += 1;
                            self.metrics.record_sent();
                        }
                        Err(e) => return classify_write_error(self.handle, e),
                    },
                }
            } else {
                tokio::select! {
                    biased;
                    _ = self.shutdown.changed() => return SubscribeState::Shutdown { clean: true },
                    frame = reader.read_frame() => match frame {
                        // Subscribers have nothing to say after the hello
                        Ok(Some(_)) => {}
                        Ok(None) | Err(_) => return SubscribeState::Cancelled,
                    },
                    _ = tokio::time::sleep(self.config.poll_interval()) => {}
                }
            }
        }
    }
}

/// Map a write failure to its terminal state
///
/// A vanished peer reads as a cancel; anything else is unexpected.
fn classify_write_error(handle: SubscriberHandle, error: WireError) -> SubscribeState {
    match &error {
        WireError::Io(e)
            if matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ) =>
        {
            SubscribeState::Cancelled
        }
        _ => {
            tracing::warn!(%handle, error = %error, "Subscriber write failed");
            SubscribeState::Failed(Status::new(StatusCode::Unknown, "write failed"))
        }
    }
}
