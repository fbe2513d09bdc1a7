//! Publisher client
//!
//! Streams packets into the proxy frontend:
//!
//! ```no_run
//! use packet_proxy::client::Publisher;
//! use packet_proxy::packet::Packet;
//!
//! # async fn example(packet: Packet) -> packet_proxy::Result<()> {
//! let mut publisher = Publisher::connect("localhost:50000", None).await?;
//! publisher.send(&packet).await?;
//! let summary = publisher.finish().await?;
//! println!("published {} packets", summary.total_packets);
//! # Ok(())
//! # }
//! ```

use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;

use crate::auth::AUTH_TOKEN_HEADER;
use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::wire::{Frame, FrameReader, FrameWriter, Hello, PublishResponse, Role, WireError};

/// Frames a server can send on a publish call are small
const MAX_INBOUND_FRAME_SIZE: usize = 8192;

/// Streaming publish call
pub struct Publisher {
    reader: FrameReader<ReadHalf<TcpStream>>,
    writer: FrameWriter<WriteHalf<TcpStream>>,
}

impl Publisher {
    /// Open a publish call to the frontend
    ///
    /// The token, when given, is attached as `x-custom-auth-token`
    /// metadata. Rejections surface on `finish` (or as an error from a
    /// later `send`), because the server answers a rejected call with a
    /// terminal status and closes.
    pub async fn connect(address: &str, access_token: Option<&str>) -> Result<Self> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = tokio::io::split(stream);

        let mut publisher = Self {
            reader: FrameReader::new(read_half, MAX_INBOUND_FRAME_SIZE),
            writer: FrameWriter::new(write_half),
        };

        let mut hello = Hello::new(Role::Publish);
        if let Some(token) = access_token {
            hello = hello.with_metadata(AUTH_TOKEN_HEADER, token);
        }
        publisher.writer.write_frame(&Frame::Hello(hello)).await?;
        Ok(publisher)
    }

    /// Send one packet
    ///
    /// A write failure usually means the server already terminated the
    /// call; the terminal status is read back so the caller sees the
    /// server's reason rather than a bare broken pipe.
    pub async fn send(&mut self, packet: &Packet) -> Result<()> {
        if let Err(e) = self.writer.write_frame(&Frame::Packet(packet.clone())).await {
            return Err(self.terminal_error(e).await);
        }
        Ok(())
    }

    /// Close the stream and collect the server's summary
    pub async fn finish(mut self) -> Result<PublishResponse> {
        if let Err(e) = self.writer.write_frame(&Frame::EndOfStream).await {
            return Err(self.terminal_error(e).await);
        }

        let mut response: Option<PublishResponse> = None;
        loop {
            match self.reader.read_frame().await {
                Ok(Some(Frame::PublishResponse(summary))) => response = Some(summary),
                Ok(Some(Frame::Status(status))) => {
                    if status.is_ok() {
                        return response.ok_or(Error::Wire(WireError::Malformed(
                            "missing publish response",
                        )));
                    }
                    return Err(Error::Rpc {
                        status: status.code,
                        message: status.message,
                    });
                }
                Ok(Some(_)) => {
                    return Err(Error::Wire(WireError::Malformed(
                        "unexpected frame on publish call",
                    )))
                }
                Ok(None) => {
                    return Err(Error::Wire(WireError::Malformed(
                        "connection closed before terminal status",
                    )))
                }
                Err(e) => return Err(Error::Wire(e)),
            }
        }
    }

    /// Cancel the call by closing the connection without an end-of-stream
    pub async fn abort(mut self) {
        let _ = self.writer.shutdown().await;
    }

    /// Read back the terminal status after a failed write
    async fn terminal_error(&mut self, write_error: WireError) -> Error {
        loop {
            match self.reader.read_frame().await {
                Ok(Some(Frame::Status(status))) if !status.is_ok() => {
                    return Error::Rpc {
                        status: status.code,
                        message: status.message,
                    }
                }
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => return Error::Wire(write_error),
            }
        }
    }
}
