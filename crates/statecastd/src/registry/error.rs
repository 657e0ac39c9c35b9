//! Registry and per-connection error types.

use statecast_core::ConnectionId;

/// Errors returned when admitting a connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Too many connections (max: {max})")]
    Full { max: usize },

    #[error("Connection already registered: {id}")]
    AlreadyRegistered { id: ConnectionId },
}

/// Errors that can occur writing to a single connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Write timeout")]
    WriteTimeout,
}
