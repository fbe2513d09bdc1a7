//! Framed wire protocol for the frontend and backend endpoints
//!
//! One TCP connection (optionally TLS) carries exactly one call. Every
//! frame is length-prefixed and tagged with a kind byte:
//!
//! ```text
//! +----------------+-----------+------------------+
//! | length: u32 BE | kind: u8  | payload          |
//! +----------------+-----------+------------------+
//!                  |<------- length bytes ------->|
//! ```
//!
//! A publish call:
//!
//! ```text
//! Publisher                                  Frontend
//!   |--- Hello { role=Publish, metadata } ------>|
//!   |--- Packet ------------------------------->|
//!   |--- Packet ------------------------------->|   (repeat)
//!   |--- EndOfStream --------------------------->|
//!   |<-- PublishResponse ------------------------|
//!   |<-- Status { Ok } --------------------------|
//! ```
//!
//! A subscribe call:
//!
//! ```text
//! Subscriber                                  Backend
//!   |--- Hello { role=Subscribe, metadata } ---->|
//!   |<-- Packet ---------------------------------|   (repeat)
//!   |<-- Status { Ok } --------------------------|   (server shutdown)
//! ```
//!
//! Rejections (`Unauthenticated`, `ResourceExhausted`, `InvalidArgument`)
//! are a terminal `Status` frame followed by connection close. A client
//! cancels by closing the connection before the terminal status.

pub mod frame;
pub mod message;
pub mod status;

pub use frame::{Frame, FrameReader, FrameWriter};
pub use message::{Hello, PublishResponse, Role};
pub use status::{Status, StatusCode};

use thiserror::Error;

/// Wire protocol failures
#[derive(Error, Debug)]
pub enum WireError {
    /// Underlying transport error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer announced a frame larger than this endpoint accepts
    #[error("frame of {size} bytes exceeds maximum of {max}")]
    FrameTooLarge {
        /// Announced frame length
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// Frame kind byte is not part of the protocol
    #[error("unknown frame kind {0}")]
    UnknownFrameKind(u8),

    /// Frame payload ended before a field was complete
    #[error("truncated frame while reading {0}")]
    Truncated(&'static str),

    /// Frame payload violates the protocol
    #[error("malformed frame: {0}")]
    Malformed(&'static str),

    /// A string field was not valid UTF-8
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),
}
