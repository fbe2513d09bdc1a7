//! Per-publisher ingest state machine
//!
//! One reactor drives one publish call:
//!
//! ```text
//! Init ──auth/cap ok──> Reading ──end of stream──> Closing ──> Done
//!   │                     │  │
//!   │                     │  └──too many invalid──> Failed ──> Done
//!   └──reject───> Failed  └──peer vanished───────> Cancelled ─> Done
//! ```
//!
//! Validation failures are per-packet: the packet is counted and skipped,
//! and only a run of consecutive failures terminates the call. Submission
//! to the ingress queue never blocks; overflow is handled downstream by
//! drop-oldest.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;

use crate::auth::{self, ConnectionSlots, SlotGuard};
use crate::config::FrontendConfig;
use crate::detector::DuplicateDetector;
use crate::packet::Packet;
use crate::proxy::IngressQueue;
use crate::server::tls::MaybeTlsStream;
use crate::stats::ProxyMetrics;
use crate::wire::{Frame, FrameReader, FrameWriter, PublishResponse, Role, Status, StatusCode, WireError};

/// Publish call lifecycle
#[derive(Debug)]
enum PublishState {
    /// Validate the hello: token, role, publisher cap
    Init,
    /// Streaming reads of packets
    Reading,
    /// Clean close: send summary and OK
    Closing,
    /// Reject or kick: send the terminal status, no summary
    Failed(Status),
    /// Peer vanished; nothing to send
    Cancelled,
    /// Terminal
    Done,
}

/// State machine for one publish call
pub(crate) struct PublishReactor {
    session_id: u64,
    peer_addr: SocketAddr,
    config: FrontendConfig,
    ingress: Arc<IngressQueue>,
    detector: Option<Arc<DuplicateDetector>>,
    metrics: Arc<ProxyMetrics>,
    slots: Arc<ConnectionSlots>,
    shutdown: watch::Receiver<bool>,
    secured: bool,

    total_packets: u64,
    packets_rejected: u64,
    consecutive_invalid: u64,
}

impl PublishReactor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        session_id: u64,
        peer_addr: SocketAddr,
        config: FrontendConfig,
        ingress: Arc<IngressQueue>,
        detector: Option<Arc<DuplicateDetector>>,
        metrics: Arc<ProxyMetrics>,
        slots: Arc<ConnectionSlots>,
        shutdown: watch::Receiver<bool>,
        secured: bool,
    ) -> Self {
        Self {
            session_id,
            peer_addr,
            config,
            ingress,
            detector,
            metrics,
            slots,
            shutdown,
            secured,
            total_packets: 0,
            packets_rejected: 0,
            consecutive_invalid: 0,
        }
    }

    /// Drive the call to completion
    pub(crate) async fn run(mut self, stream: MaybeTlsStream) {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = FrameReader::new(read_half, self.config.maximum_message_size_bytes);
        let mut writer = FrameWriter::new(write_half);

        // Held for the lifetime of an admitted call; dropping it returns
        // the publisher slot.
        let mut slot: Option<SlotGuard> = None;

        let mut state = PublishState::Init;
        loop {
            state = match state {
                PublishState::Init => self.init(&mut reader, &mut slot).await,
                PublishState::Reading => self.read_packets(&mut reader).await,
                PublishState::Closing => {
                    let response = PublishResponse {
                        total_packets: self.total_packets,
                        packets_rejected: self.packets_rejected,
                    };
                    if let Err(e) = writer.write_frame(&Frame::PublishResponse(response)).await {
                        tracing::debug!(
                            session_id = self.session_id,
                            error = %e,
                            "Failed to send publish response"
                        );
                    } else if let Err(e) = writer.write_status(Status::ok()).await {
                        tracing::debug!(
                            session_id = self.session_id,
                            error = %e,
                            "Failed to send terminal status"
                        );
                    }
                    let _ = writer.shutdown().await;
                    PublishState::Done
                }
                PublishState::Failed(status) => {
                    if let Err(e) = writer.write_status(status).await {
                        tracing::debug!(
                            session_id = self.session_id,
                            error = %e,
                            "Failed to send terminal status"
                        );
                    }
                    let _ = writer.shutdown().await;
                    PublishState::Done
                }
                PublishState::Cancelled => {
                    tracing::info!(
                        session_id = self.session_id,
                        peer = %self.peer_addr,
                        "Publish call canceled by peer"
                    );
                    PublishState::Done
                }
                PublishState::Done => break,
            };
        }

        drop(slot);
        tracing::info!(
            session_id = self.session_id,
            peer = %self.peer_addr,
            total_packets = self.total_packets,
            packets_rejected = self.packets_rejected,
            "Publish call completed"
        );
    }

    /// Token check, role check, publisher cap
    async fn init<R>(
        &mut self,
        reader: &mut FrameReader<R>,
        slot: &mut Option<SlotGuard>,
    ) -> PublishState
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let hello = match reader.read_frame().await {
            Ok(Some(Frame::Hello(hello))) => hello,
            Ok(Some(_)) => {
                return PublishState::Failed(Status::new(
                    StatusCode::InvalidArgument,
                    "expected hello frame",
                ))
            }
            Ok(None) | Err(_) => return PublishState::Cancelled,
        };

        if hello.role != Role::Publish {
            return PublishState::Failed(Status::new(
                StatusCode::InvalidArgument,
                "connection is not a publish call",
            ));
        }

        // Token enforcement requires TLS
        if self.secured {
            if let Some(token) = &self.config.access_token {
                if !auth::validate_token(&hello.metadata, token) {
                    tracing::info!(peer = %self.peer_addr, "Frontend rejected publisher token");
                    return PublishState::Failed(Status::new(
                        StatusCode::Unauthenticated,
                        "publisher must provide access token in x-custom-auth-token header",
                    ));
                }
                tracing::info!(peer = %self.peer_addr, "Frontend validated publisher token");
            }
        }

        match self.slots.try_acquire() {
            Some(guard) => *slot = Some(guard),
            None => {
                tracing::warn!(
                    peer = %self.peer_addr,
                    "Frontend rejecting publisher because max number of publishers hit"
                );
                return PublishState::Failed(Status::new(
                    StatusCode::ResourceExhausted,
                    "max publishers hit - try again later",
                ));
            }
        }

        if *self.shutdown.borrow() {
            tracing::warn!(session_id = self.session_id, "Immediately closing publish call");
            return PublishState::Closing;
        }

        tracing::info!(
            session_id = self.session_id,
            peer = %self.peer_addr,
            publishers = self.slots.active(),
            "Publisher admitted"
        );
        PublishState::Reading
    }

    /// Streaming read loop; returns the next terminal-ish state
    async fn read_packets<R>(&mut self, reader: &mut FrameReader<R>) -> PublishState
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        loop {
            tokio::select! {
                _ = self.shutdown.changed() => return PublishState::Closing,
                frame = reader.read_frame() => match frame {
                    Ok(Some(Frame::Packet(packet))) => {
                        if let Some(next) = self.on_packet(packet) {
                            return next;
                        }
                    }
                    Ok(Some(Frame::EndOfStream)) => return PublishState::Closing,
                    Ok(Some(_)) => {
                        return PublishState::Failed(Status::new(
                            StatusCode::InvalidArgument,
                            "unexpected frame in publish stream",
                        ))
                    }
                    Ok(None) => return PublishState::Cancelled,
                    Err(WireError::FrameTooLarge { size, max }) => {
                        tracing::warn!(
                            session_id = self.session_id,
                            size,
                            max,
                            "Publisher sent oversized message"
                        );
                        return PublishState::Failed(Status::new(
                            StatusCode::InvalidArgument,
                            "message exceeds maximum size",
                        ));
                    }
                    Err(e) => {
                        tracing::debug!(
                            session_id = self.session_id,
                            error = %e,
                            "Publish stream read failed"
                        );
                        return PublishState::Cancelled;
                    }
                },
            }
        }
    }

    /// Validate, normalize, and submit one packet
    ///
    /// Returns the next state when the call must terminate.
    fn on_packet(&mut self, mut packet: Packet) -> Option<PublishState> {
        self.total_packets += 1;
        self.metrics.record_received();

        let mut admitted = false;
        if packet.is_valid() {
            packet.normalize();
            if packet.identifier.is_complete() {
                admitted = true;
            }
        }

        if admitted {
            if let Some(detector) = &self.detector {
                if !detector.allow(&packet) {
                    // A retransmit, not a malformed packet: drop it without
                    // touching the rejection counters.
                    self.metrics.record_duplicate();
                    tracing::debug!(
                        session_id = self.session_id,
                        identifier = %packet.identifier,
                        "Dropping duplicate packet"
                    );
                    return None;
                }
            }
            self.ingress.push(packet);
            self.consecutive_invalid = 0;
            return None;
        }

        self.packets_rejected += 1;
        self.consecutive_invalid += 1;
        self.metrics.record_rejected();

        if self.consecutive_invalid > self.config.maximum_number_of_consecutive_invalid_messages {
            tracing::warn!(
                session_id = self.session_id,
                peer = %self.peer_addr,
                "Frontend disconnecting publisher because it sent too many consecutive invalid messages"
            );
            return Some(PublishState::Failed(Status::new(
                StatusCode::InvalidArgument,
                "too many consecutive messages were invalid - double check API",
            )));
        }
        None
    }
}
