//! Connection registry.
//!
//! The registry is the set of stream connections that currently receive
//! broadcasts. Membership is the only source of truth for "who gets the next
//! message": a connection is in the set exactly while it is believed
//! writable.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐  add     ┌──────────────────────────┐  snapshot  ┌─────────────────┐
//! │ Admission Loop  │─────────▶│   ConnectionRegistry     │───────────▶│   Broadcaster   │
//! └─────────────────┘          │ Mutex<HashMap<Id, Conn>> │            └────────┬────────┘
//! ┌─────────────────┐  remove  │                          │   remove on        │
//! │Liveness Monitor │─────────▶│                          │◀──write failure────┘
//! └─────────────────┘          └──────────────────────────┘
//! ```
//!
//! The lock guards membership only. Broadcast writes happen on a snapshot
//! taken under the lock and then released, so a slow peer never blocks
//! connects and disconnects of unrelated peers.
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - Removal is idempotent and never fails

mod connection;
mod error;
mod handle;

pub use connection::{Connection, ConnectionWriter};
pub use error::{ConnectionError, RegistryError};
pub use handle::ConnectionRegistry;
