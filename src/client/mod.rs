//! Client-side wire protocol
//!
//! Async publisher and subscriber clients for the proxy endpoints, used
//! by the integration tests and by downstream tooling. Both connect over
//! plaintext TCP and optionally attach an access token to the hello
//! frame's metadata.

pub mod publisher;
pub mod subscriber;

pub use publisher::Publisher;
pub use subscriber::Subscriber;
