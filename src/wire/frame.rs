//! Frame codec and async reader/writer
//!
//! Frames are `u32` big-endian length, one kind byte, then the payload.
//! The reader enforces a per-endpoint maximum frame size so a misbehaving
//! peer cannot make the proxy buffer arbitrary amounts of memory.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::message::{self, Hello, PublishResponse};
use super::status::{Status, StatusCode};
use super::WireError;
use crate::packet::Packet;

const KIND_HELLO: u8 = 1;
const KIND_PACKET: u8 = 2;
const KIND_END_OF_STREAM: u8 = 3;
const KIND_PUBLISH_RESPONSE: u8 = 4;
const KIND_STATUS: u8 = 5;

/// One protocol frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Call initiation with role and metadata
    Hello(Hello),
    /// One data packet
    Packet(Packet),
    /// Publisher finished its stream cleanly
    EndOfStream,
    /// Publish call summary
    PublishResponse(PublishResponse),
    /// Terminal status
    Status(Status),
}

impl Frame {
    fn kind(&self) -> u8 {
        match self {
            Frame::Hello(_) => KIND_HELLO,
            Frame::Packet(_) => KIND_PACKET,
            Frame::EndOfStream => KIND_END_OF_STREAM,
            Frame::PublishResponse(_) => KIND_PUBLISH_RESPONSE,
            Frame::Status(_) => KIND_STATUS,
        }
    }

    /// Encode kind byte plus payload (no length prefix)
    fn encode_body(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(self.kind());
        match self {
            Frame::Hello(hello) => hello.encode(&mut buf),
            Frame::Packet(packet) => message::encode_packet(packet, &mut buf),
            Frame::EndOfStream => {}
            Frame::PublishResponse(response) => response.encode(&mut buf),
            Frame::Status(status) => {
                buf.put_u8(status.code.as_u8());
                message::put_string(&mut buf, &status.message);
            }
        }
        buf.freeze()
    }

    /// Decode a frame body (kind byte plus payload)
    fn decode_body(mut body: Bytes) -> Result<Self, WireError> {
        let kind = message::get_u8(&mut body, "frame kind")?;
        match kind {
            KIND_HELLO => Ok(Frame::Hello(Hello::decode(&mut body)?)),
            KIND_PACKET => Ok(Frame::Packet(message::decode_packet(&mut body)?)),
            KIND_END_OF_STREAM => Ok(Frame::EndOfStream),
            KIND_PUBLISH_RESPONSE => {
                Ok(Frame::PublishResponse(PublishResponse::decode(&mut body)?))
            }
            KIND_STATUS => {
                let code = StatusCode::from_u8(message::get_u8(&mut body, "status code")?);
                let text = message::get_string(&mut body, "status message")?;
                Ok(Frame::Status(Status::new(code, text)))
            }
            other => Err(WireError::UnknownFrameKind(other)),
        }
    }
}

/// Reads frames from the transport
pub struct FrameReader<R> {
    io: R,
    max_frame_size: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a reader enforcing the given maximum frame size
    pub fn new(io: R, max_frame_size: usize) -> Self {
        Self { io, max_frame_size }
    }

    /// Read the next frame
    ///
    /// Returns `Ok(None)` when the peer closed the connection at a frame
    /// boundary. An EOF inside a frame is reported as an error, as is a
    /// frame larger than this endpoint's maximum.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, WireError> {
        let mut length_buf = [0u8; 4];
        match self.io.read_exact(&mut length_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(WireError::Io(e)),
        }

        let length = u32::from_be_bytes(length_buf) as usize;
        if length == 0 {
            return Err(WireError::Malformed("zero-length frame"));
        }
        if length > self.max_frame_size {
            return Err(WireError::FrameTooLarge {
                size: length,
                max: self.max_frame_size,
            });
        }

        let mut body = vec![0u8; length];
        self.io.read_exact(&mut body).await?;
        Frame::decode_body(Bytes::from(body)).map(Some)
    }
}

/// Writes frames to the transport
pub struct FrameWriter<W> {
    io: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Create a writer
    pub fn new(io: W) -> Self {
        Self { io }
    }

    /// Write one frame and flush it
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), WireError> {
        let body = frame.encode_body();
        let mut buf = BytesMut::with_capacity(4 + body.len());
        buf.put_u32(body.len() as u32);
        buf.put_slice(&body);
        self.io.write_all(&buf).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Write a terminal status frame
    pub async fn write_status(&mut self, status: Status) -> Result<(), WireError> {
        self.write_frame(&Frame::Status(status)).await
    }

    /// Flush and shut down the write side
    pub async fn shutdown(&mut self) -> Result<(), WireError> {
        self.io.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{DataType, StreamIdentifier};
    use crate::wire::Role;

    async fn roundtrip(frame: Frame) -> Frame {
        let (client, server) = tokio::io::duplex(1024);
        let mut writer = FrameWriter::new(client);
        let mut reader = FrameReader::new(server, 8192);

        writer.write_frame(&frame).await.unwrap();
        reader.read_frame().await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_status_frame_roundtrip() {
        let frame = Frame::Status(Status::new(StatusCode::ResourceExhausted, "full up"));
        assert_eq!(roundtrip(frame.clone()).await, frame);
    }

    #[tokio::test]
    async fn test_packet_frame_roundtrip() {
        let frame = Frame::Packet(Packet {
            identifier: StreamIdentifier::new("UU", "CWU", "HHZ", "01"),
            start_time_micros: 42,
            sampling_rate: 100.0,
            number_of_samples: 1,
            data_type: DataType::Integer32,
            data: Bytes::from_static(&[7, 0, 0, 0]),
        });
        assert_eq!(roundtrip(frame.clone()).await, frame);
    }

    #[tokio::test]
    async fn test_end_of_stream_roundtrip() {
        assert_eq!(roundtrip(Frame::EndOfStream).await, Frame::EndOfStream);
    }

    #[tokio::test]
    async fn test_clean_eof_returns_none() {
        let (client, server) = tokio::io::duplex(64);
        drop(client);

        let mut reader = FrameReader::new(server, 8192);
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (client, server) = tokio::io::duplex(1 << 20);
        let mut writer = FrameWriter::new(client);
        let mut reader = FrameReader::new(server, 32);

        let frame = Frame::Hello(
            Hello::new(Role::Publish).with_metadata("key", "a long enough metadata value"),
        );
        writer.write_frame(&frame).await.unwrap();

        assert!(matches!(
            reader.read_frame().await,
            Err(WireError::FrameTooLarge { .. })
        ));
    }
}
