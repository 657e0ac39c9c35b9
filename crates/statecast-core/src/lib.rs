//! statecast Core - Shared types for the datagram relay
//!
//! This crate provides the I/O-free domain types used by the daemon
//! (statecastd): the running state accumulator, connection identity,
//! and the annotated message format sent to stream clients.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod connection;
pub mod error;
pub mod message;
pub mod state;

// Re-exports for convenience
pub use connection::ConnectionId;
pub use error::PayloadError;
pub use message::{annotate, parse_delta, Datagram, MESSAGE_DELIMITER};
pub use state::StateCell;
