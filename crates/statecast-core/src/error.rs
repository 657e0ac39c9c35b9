//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Reasons a datagram payload is not an integer update.
///
/// These are never surfaced as failures of the relay: a payload that does
/// not parse is still broadcast, it just leaves the state untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// Payload bytes are not valid UTF-8
    #[error("Payload is not valid UTF-8")]
    NotUtf8,

    /// Payload is text but not a base-10 signed 64-bit integer
    #[error("Payload is not a base-10 integer: {reason}")]
    NotInteger { reason: String },
}
