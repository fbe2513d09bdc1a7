//! Registry error types

use thiserror::Error;

use super::SubscriberHandle;

/// Error type for registry operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No entry for the given handle
    #[error("{0} is not registered")]
    SubscriberNotFound(SubscriberHandle),

    /// The registry has been shut down
    #[error("registry is shut down")]
    ShutDown,

    /// Queue capacity must be at least one
    #[error("queue capacity must be positive")]
    InvalidCapacity,
}
