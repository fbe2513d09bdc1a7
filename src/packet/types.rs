//! Packet and sample data types

use bytes::Bytes;

use super::identifier::StreamIdentifier;

/// Encoding of the packed sample payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataType {
    /// Unset; packets with this type are invalid
    #[default]
    Unknown,
    /// 32-bit signed integers
    Integer32,
    /// 64-bit signed integers
    Integer64,
    /// 32-bit floats
    Float,
    /// 64-bit floats
    Double,
}

impl DataType {
    /// Wire value for this data type
    pub fn as_u8(self) -> u8 {
        match self {
            DataType::Unknown => 0,
            DataType::Integer32 => 1,
            DataType::Integer64 => 2,
            DataType::Float => 3,
            DataType::Double => 4,
        }
    }

    /// Decode a wire value; unrecognized values map to `Unknown`
    ///
    /// Mapping to `Unknown` rather than erroring keeps decoding total: the
    /// packet will be rejected by validation instead of killing the read.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => DataType::Integer32,
            2 => DataType::Integer64,
            3 => DataType::Float,
            4 => DataType::Double,
            _ => DataType::Unknown,
        }
    }
}

/// One sample burst on a single stream
///
/// Cheap to clone: the payload is reference-counted `Bytes`, so fan-out to
/// many subscribers shares one allocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Packet {
    /// Stream this packet belongs to
    pub identifier: StreamIdentifier,
    /// Start of the burst, microseconds since the Unix epoch
    pub start_time_micros: i64,
    /// Sampling rate in Hz
    pub sampling_rate: f64,
    /// Number of samples in the payload
    pub number_of_samples: u32,
    /// Payload encoding
    pub data_type: DataType,
    /// Packed sample payload
    pub data: Bytes,
}

impl Packet {
    /// Whether the packet passes the numeric admission checks
    ///
    /// Identifier completeness is checked separately, after normalization,
    /// because trimming can empty a field that looked populated.
    pub fn is_valid(&self) -> bool {
        self.number_of_samples > 0
            && self.sampling_rate > 0.0
            && self.data_type != DataType::Unknown
    }

    /// Canonicalize the stream identifier in place
    pub fn normalize(&mut self) {
        self.identifier.normalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn good_packet() -> Packet {
        Packet {
            identifier: StreamIdentifier::new("UU", "CWU", "HHZ", "01"),
            start_time_micros: 1_700_000_000_000_000,
            sampling_rate: 100.0,
            number_of_samples: 250,
            data_type: DataType::Integer32,
            data: Bytes::from_static(&[0u8; 16]),
        }
    }

    #[test]
    fn test_valid_packet() {
        assert!(good_packet().is_valid());
    }

    #[test]
    fn test_zero_samples_invalid() {
        let mut packet = good_packet();
        packet.number_of_samples = 0;
        assert!(!packet.is_valid());
    }

    #[test]
    fn test_nonpositive_sampling_rate_invalid() {
        let mut packet = good_packet();
        packet.sampling_rate = 0.0;
        assert!(!packet.is_valid());

        packet.sampling_rate = -100.0;
        assert!(!packet.is_valid());
    }

    #[test]
    fn test_unknown_data_type_invalid() {
        let mut packet = good_packet();
        packet.data_type = DataType::Unknown;
        assert!(!packet.is_valid());
    }

    #[test]
    fn test_data_type_wire_values() {
        for data_type in [
            DataType::Unknown,
            DataType::Integer32,
            DataType::Integer64,
            DataType::Float,
            DataType::Double,
        ] {
            assert_eq!(DataType::from_u8(data_type.as_u8()), data_type);
        }

        // Unrecognized values decode as Unknown
        assert_eq!(DataType::from_u8(250), DataType::Unknown);
    }
}
