//! Data packet types
//!
//! A packet is one time-bounded burst of samples tagged with the stream it
//! belongs to. The proxy treats the sample payload as opaque bytes; only
//! the identifier, timing, and shape fields are inspected for admission.

pub mod identifier;
pub mod types;

pub use identifier::StreamIdentifier;
pub use types::{DataType, Packet};
