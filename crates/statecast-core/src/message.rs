//! Datagram payload interpretation and the outbound message format.
//!
//! Every datagram becomes exactly one line on every stream client:
//!
//! ```text
//! [from <source>] state: <value><raw payload bytes>\n
//! ```
//!
//! The payload is copied verbatim, so a payload that itself contains a
//! newline will split across two lines on the reader's side. Framing beyond
//! the single trailing delimiter is not provided.

use std::io::Write;
use std::net::SocketAddr;

use crate::error::PayloadError;

/// Delimiter appended to every outbound message.
pub const MESSAGE_DELIMITER: u8 = b'\n';

/// A received datagram, borrowed from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datagram<'a> {
    /// Address the datagram came from
    pub source: SocketAddr,

    /// Raw payload bytes
    pub payload: &'a [u8],
}

impl<'a> Datagram<'a> {
    pub fn new(source: SocketAddr, payload: &'a [u8]) -> Self {
        Self { source, payload }
    }

    /// Builds the outbound message for this datagram at the given state.
    pub fn annotate(&self, state: i64) -> Vec<u8> {
        annotate(self.source, state, self.payload)
    }
}

/// Parses a whole payload as a base-10 signed 64-bit integer.
///
/// Accepts an optional leading `+` or `-` followed by ASCII digits. Leading
/// or trailing whitespace (including a trailing newline) is not accepted.
pub fn parse_delta(payload: &[u8]) -> Result<i64, PayloadError> {
    let text = std::str::from_utf8(payload).map_err(|_| PayloadError::NotUtf8)?;
    text.parse::<i64>()
        .map_err(|e| PayloadError::NotInteger {
            reason: e.to_string(),
        })
}

/// Formats `"[from <source>] state: <state>" + payload + "\n"`.
pub fn annotate(source: SocketAddr, state: i64, payload: &[u8]) -> Vec<u8> {
    // "[from " + addr (<= 47) + "] state: " + i64 (<= 20) + payload + "\n"
    let mut out = Vec::with_capacity(80 + payload.len());
    // Writing into a Vec cannot fail.
    let _ = write!(out, "[from {source}] state: {state}");
    out.extend_from_slice(payload);
    out.push(MESSAGE_DELIMITER);
    out
}
