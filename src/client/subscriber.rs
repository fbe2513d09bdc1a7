//! Subscriber client
//!
//! Receives the proxy's packet stream from the backend:
//!
//! ```no_run
//! use packet_proxy::client::Subscriber;
//!
//! # async fn example() -> packet_proxy::Result<()> {
//! let mut subscriber = Subscriber::connect("localhost:50001", None).await?;
//! while let Some(packet) = subscriber.next().await? {
//!     println!("{}: {} samples", packet.identifier, packet.number_of_samples);
//! }
//! # Ok(())
//! # }
//! ```

use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;

use crate::auth::AUTH_TOKEN_HEADER;
use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::wire::{Frame, FrameReader, FrameWriter, Hello, Role, WireError};

/// Upper bound on inbound frames; sized for packets, not just statuses
const MAX_INBOUND_FRAME_SIZE: usize = 1 << 20;

/// Streaming subscribe call
pub struct Subscriber {
    reader: FrameReader<ReadHalf<TcpStream>>,
    writer: FrameWriter<WriteHalf<TcpStream>>,
}

impl Subscriber {
    /// Open a subscribe call to the backend
    pub async fn connect(address: &str, access_token: Option<&str>) -> Result<Self> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = tokio::io::split(stream);

        let mut subscriber = Self {
            reader: FrameReader::new(read_half, MAX_INBOUND_FRAME_SIZE),
            writer: FrameWriter::new(write_half),
        };

        let mut hello = Hello::new(Role::Subscribe);
        if let Some(token) = access_token {
            hello = hello.with_metadata(AUTH_TOKEN_HEADER, token);
        }
        subscriber.writer.write_frame(&Frame::Hello(hello)).await?;
        Ok(subscriber)
    }

    /// Receive the next packet
    ///
    /// Returns `None` when the server finished the stream cleanly. A
    /// non-OK terminal status (rejection, kick) surfaces as `Error::Rpc`.
    pub async fn next(&mut self) -> Result<Option<Packet>> {
        match self.reader.read_frame().await {
            Ok(Some(Frame::Packet(packet))) => Ok(Some(packet)),
            Ok(Some(Frame::Status(status))) => {
                if status.is_ok() {
                    Ok(None)
                } else {
                    Err(Error::Rpc {
                        status: status.code,
                        message: status.message,
                    })
                }
            }
            Ok(Some(_)) => Err(Error::Wire(WireError::Malformed(
                "unexpected frame on subscribe call",
            ))),
            // An abrupt close without a status: the server went away
            Ok(None) => Ok(None),
            Err(e) => Err(Error::Wire(e)),
        }
    }

    /// Cancel the call by closing the connection
    pub async fn cancel(mut self) {
        let _ = self.writer.shutdown().await;
    }
}
