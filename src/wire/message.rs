//! Frame payload types and field codecs
//!
//! Field encoding: integers are big-endian; strings are `u16` length plus
//! UTF-8 bytes; the sample payload is `u32` length plus raw bytes. The
//! metadata map is a `u16` pair count followed by key/value strings.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::WireError;
use crate::packet::{DataType, Packet, StreamIdentifier};

/// Which service a connection is calling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Frontend publish call (client streams packets in)
    Publish,
    /// Backend subscribe call (server streams packets out)
    Subscribe,
}

impl Role {
    pub(super) fn as_u8(self) -> u8 {
        match self {
            Role::Publish => 0,
            Role::Subscribe => 1,
        }
    }

    pub(super) fn from_u8(value: u8) -> Result<Self, WireError> {
        match value {
            0 => Ok(Role::Publish),
            1 => Ok(Role::Subscribe),
            _ => Err(WireError::Malformed("unknown hello role")),
        }
    }
}

/// First frame of every call
///
/// Carries the role and request metadata. The access token travels here
/// under the `x-custom-auth-token` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    /// Which service is being called
    pub role: Role,
    /// String key/value metadata; keys are matched case-insensitively
    pub metadata: Vec<(String, String)>,
}

impl Hello {
    /// Hello with no metadata
    pub fn new(role: Role) -> Self {
        Self {
            role,
            metadata: Vec::new(),
        }
    }

    /// Attach a metadata pair
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    pub(super) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.role.as_u8());
        buf.put_u16(self.metadata.len() as u16);
        for (key, value) in &self.metadata {
            put_string(buf, key);
            put_string(buf, value);
        }
    }

    pub(super) fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        let role = Role::from_u8(get_u8(buf, "hello role")?)?;
        let count = get_u16(buf, "metadata count")?;
        let mut metadata = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let key = get_string(buf, "metadata key")?;
            let value = get_string(buf, "metadata value")?;
            metadata.push((key, value));
        }
        Ok(Self { role, metadata })
    }
}

/// Publish call summary, sent before the terminal status on a clean close
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishResponse {
    /// Packets received on the call, valid or not
    pub total_packets: u64,
    /// Packets that failed validation or normalization
    pub packets_rejected: u64,
}

impl PublishResponse {
    pub(super) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.total_packets);
        buf.put_u64(self.packets_rejected);
    }

    pub(super) fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            total_packets: get_u64(buf, "total packets")?,
            packets_rejected: get_u64(buf, "packets rejected")?,
        })
    }
}

pub(super) fn encode_packet(packet: &Packet, buf: &mut BytesMut) {
    put_string(buf, &packet.identifier.network);
    put_string(buf, &packet.identifier.station);
    put_string(buf, &packet.identifier.channel);
    put_string(buf, &packet.identifier.location_code);
    buf.put_i64(packet.start_time_micros);
    buf.put_f64(packet.sampling_rate);
    buf.put_u32(packet.number_of_samples);
    buf.put_u8(packet.data_type.as_u8());
    buf.put_u32(packet.data.len() as u32);
    buf.put_slice(&packet.data);
}

pub(super) fn decode_packet(buf: &mut Bytes) -> Result<Packet, WireError> {
    let network = get_string(buf, "network")?;
    let station = get_string(buf, "station")?;
    let channel = get_string(buf, "channel")?;
    let location_code = get_string(buf, "location code")?;
    let start_time_micros = get_i64(buf, "start time")?;
    let sampling_rate = get_f64(buf, "sampling rate")?;
    let number_of_samples = get_u32(buf, "number of samples")?;
    let data_type = DataType::from_u8(get_u8(buf, "data type")?);
    let data = get_blob(buf, "sample payload")?;

    Ok(Packet {
        identifier: StreamIdentifier::new(network, station, channel, location_code),
        start_time_micros,
        sampling_rate,
        number_of_samples,
        data_type,
        data,
    })
}

// Field codecs. All reads are bounds-checked so a malformed payload
// surfaces as a WireError rather than a panic.

pub(super) fn put_string(buf: &mut BytesMut, value: &str) {
    buf.put_u16(value.len() as u16);
    buf.put_slice(value.as_bytes());
}

pub(super) fn get_u8(buf: &mut Bytes, field: &'static str) -> Result<u8, WireError> {
    if buf.remaining() < 1 {
        return Err(WireError::Truncated(field));
    }
    Ok(buf.get_u8())
}

pub(super) fn get_u16(buf: &mut Bytes, field: &'static str) -> Result<u16, WireError> {
    if buf.remaining() < 2 {
        return Err(WireError::Truncated(field));
    }
    Ok(buf.get_u16())
}

pub(super) fn get_u32(buf: &mut Bytes, field: &'static str) -> Result<u32, WireError> {
    if buf.remaining() < 4 {
        return Err(WireError::Truncated(field));
    }
    Ok(buf.get_u32())
}

pub(super) fn get_u64(buf: &mut Bytes, field: &'static str) -> Result<u64, WireError> {
    if buf.remaining() < 8 {
        return Err(WireError::Truncated(field));
    }
    Ok(buf.get_u64())
}

pub(super) fn get_i64(buf: &mut Bytes, field: &'static str) -> Result<i64, WireError> {
    if buf.remaining() < 8 {
        return Err(WireError::Truncated(field));
    }
    Ok(buf.get_i64())
}

pub(super) fn get_f64(buf: &mut Bytes, field: &'static str) -> Result<f64, WireError> {
    if buf.remaining() < 8 {
        return Err(WireError::Truncated(field));
    }
    Ok(buf.get_f64())
}

pub(super) fn get_string(buf: &mut Bytes, field: &'static str) -> Result<String, WireError> {
    let len = get_u16(buf, field)? as usize;
    if buf.remaining() < len {
        return Err(WireError::Truncated(field));
    }
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| WireError::InvalidUtf8(field))
}

pub(super) fn get_blob(buf: &mut Bytes, field: &'static str) -> Result<Bytes, WireError> {
    let len = get_u32(buf, field)? as usize;
    if buf.remaining() < len {
        return Err(WireError::Truncated(field));
    }
    // Zero-copy: the payload shares the frame's allocation
    Ok(buf.split_to(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_roundtrip() {
        let hello = Hello::new(Role::Publish)
            .with_metadata("x-custom-auth-token", "secret")
            .with_metadata("client", "test");

        let mut buf = BytesMut::new();
        hello.encode(&mut buf);
        let decoded = Hello::decode(&mut buf.freeze()).unwrap();

        assert_eq!(decoded, hello);
    }

    #[test]
    fn test_packet_roundtrip() {
        let packet = Packet {
            identifier: StreamIdentifier::new("UU", "CWU", "HHZ", "01"),
            start_time_micros: 1_700_000_000_123_456,
            sampling_rate: 100.0,
            number_of_samples: 3,
            data_type: DataType::Integer32,
            data: Bytes::from_static(&[1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0]),
        };

        let mut buf = BytesMut::new();
        encode_packet(&packet, &mut buf);
        let decoded = decode_packet(&mut buf.freeze()).unwrap();

        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_truncated_packet_errors() {
        let packet = Packet {
            identifier: StreamIdentifier::new("UU", "CWU", "HHZ", "01"),
            sampling_rate: 100.0,
            number_of_samples: 1,
            data_type: DataType::Integer32,
            data: Bytes::from_static(&[0, 0, 0, 0]),
            ..Packet::default()
        };

        let mut buf = BytesMut::new();
        encode_packet(&packet, &mut buf);
        let mut short = buf.freeze().slice(0..10);

        assert!(matches!(
            decode_packet(&mut short),
            Err(WireError::Truncated(_))
        ));
    }

    #[test]
    fn test_bad_role_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u8(9);
        buf.put_u16(0);

        assert!(matches!(
            Hello::decode(&mut buf.freeze()),
            Err(WireError::Malformed(_))
        ));
    }
}
