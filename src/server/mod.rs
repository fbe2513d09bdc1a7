//! Shared listener plumbing for the frontend and backend endpoints
//!
//! Both endpoints bind a TCP listener, optionally wrap accepted sockets
//! in TLS, and hand connections to their per-call reactors. The TLS
//! decision is made once at bind time: credentials configured means a
//! secured listener, otherwise plaintext.

pub mod tls;

use std::net::SocketAddr;
use std::path::Path;

use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use crate::error::Result;

use tls::MaybeTlsStream;

/// A bound endpoint listener, plaintext or TLS
pub struct Endpoint {
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    local_addr: SocketAddr,
    name: &'static str,
}

impl Endpoint {
    /// Bind a listener, loading TLS credentials when both are configured
    ///
    /// Configuration validation has already established that the paths
    /// come in pairs and the files exist.
    pub async fn bind(
        name: &'static str,
        address: &str,
        server_key_path: Option<&Path>,
        server_certificate_path: Option<&Path>,
    ) -> Result<Self> {
        let tls = match (server_key_path, server_certificate_path) {
            (Some(key), Some(certificate)) => {
                tracing::info!("Initiating secured proxy {}", name);
                Some(tls::load_acceptor(key, certificate)?)
            }
            _ => {
                tracing::info!("Initiating non-secured proxy {}", name);
                None
            }
        };

        let listener = TcpListener::bind(address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(endpoint = name, addr = %local_addr, "Listening");

        Ok(Self {
            listener,
            tls,
            local_addr,
            name,
        })
    }

    /// Accept one connection, completing the TLS handshake if secured
    pub async fn accept(&self) -> Result<(MaybeTlsStream, SocketAddr)> {
        let (socket, peer_addr) = self.listener.accept().await?;
        socket.set_nodelay(true)?;

        let stream = match &self.tls {
            Some(acceptor) => {
                let tls_stream = acceptor.accept(socket).await?;
                MaybeTlsStream::Tls(Box::new(tls_stream))
            }
            None => MaybeTlsStream::Plain(socket),
        };
        Ok((stream, peer_addr))
    }

    /// Whether this listener terminates TLS
    pub fn is_secured(&self) -> bool {
        self.tls.is_some()
    }

    /// The bound address (useful when binding port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Endpoint name for logs
    pub fn name(&self) -> &'static str {
        self.name
    }
}
