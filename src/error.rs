//! Crate-wide error type
//!
//! Configuration and listener-bind failures are fatal and surface to the
//! process exit code. Everything else is recovered close to where it
//! happens: per-packet problems are counted, per-connection problems end
//! that connection with a terminal status.

use thiserror::Error;

use crate::registry::RegistryError;
use crate::wire::{StatusCode, WireError};

/// Errors surfaced by the proxy library
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error (bind, accept, read, write)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or inconsistent configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Wire protocol violation
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Subscription registry failure
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// TLS setup failure
    #[error("TLS error: {0}")]
    Tls(#[from] tokio_rustls::rustls::Error),

    /// A call finished with a non-OK terminal status
    #[error("rpc finished with {status:?}: {message}")]
    Rpc {
        /// Terminal status code sent by the server
        status: StatusCode,
        /// Human-readable detail
        message: String,
    },
}

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
