//! Terminal call status
//!
//! Every call ends with a `Status` frame (or an abrupt close, which the
//! peer reads as a cancel). Codes mirror gRPC numbering so operators see
//! familiar values in logs.

/// Terminal status code for a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// Clean completion
    Ok,
    /// Call cancelled by the peer
    Cancelled,
    /// Unexpected failure (e.g., a write error mid-stream)
    Unknown,
    /// Peer violated the protocol or sent too many invalid packets
    InvalidArgument,
    /// Publisher or subscriber cap reached
    ResourceExhausted,
    /// Missing or mismatched access token
    Unauthenticated,
}

impl StatusCode {
    /// Wire value (gRPC numbering)
    pub fn as_u8(self) -> u8 {
        match self {
            StatusCode::Ok => 0,
            StatusCode::Cancelled => 1,
            StatusCode::Unknown => 2,
            StatusCode::InvalidArgument => 3,
            StatusCode::ResourceExhausted => 8,
            StatusCode::Unauthenticated => 16,
        }
    }

    /// Decode a wire value; unrecognized codes collapse to `Unknown`
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => StatusCode::Ok,
            1 => StatusCode::Cancelled,
            3 => StatusCode::InvalidArgument,
            8 => StatusCode::ResourceExhausted,
            16 => StatusCode::Unauthenticated,
            _ => StatusCode::Unknown,
        }
    }
}

/// Terminal status with a human-readable message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// Status code
    pub code: StatusCode,
    /// Detail for logs and error messages; empty on `Ok`
    pub message: String,
}

impl Status {
    /// Clean completion
    pub fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
            message: String::new(),
        }
    }

    /// Status with a detail message
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Whether this is a clean completion
    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_roundtrip() {
        for code in [
            StatusCode::Ok,
            StatusCode::Cancelled,
            StatusCode::Unknown,
            StatusCode::InvalidArgument,
            StatusCode::ResourceExhausted,
            StatusCode::Unauthenticated,
        ] {
            assert_eq!(StatusCode::from_u8(code.as_u8()), code);
        }
    }

    #[test]
    fn test_unrecognized_code_is_unknown() {
        assert_eq!(StatusCode::from_u8(99), StatusCode::Unknown);
    }
}
