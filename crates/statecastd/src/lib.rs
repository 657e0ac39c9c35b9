//! statecast Daemon - Connection registry and datagram broadcast server
//!
//! This crate provides the relay core:
//! - `registry` - Set of stream connections that receive broadcasts
//! - `broadcast` - Fan-out of one payload to every registered connection
//! - `server` - Admission, liveness and ingestion loops, and the server tying them together
//! - `config` - Layered relay configuration
//! - `stats` / `monitor` - Counters and periodic resource logging
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     statecastd daemon                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │  IngestionLoop  │────▶│        Broadcaster          │   │
//! │  │  (UDP socket)   │     │  (snapshot + evict on fail) │   │
//! │  └─────────────────┘     └──────────────┬──────────────┘   │
//! │                                         │                   │
//! │  ┌─────────────────┐     ┌──────────────▼──────────────┐   │
//! │  │  AdmissionLoop  │────▶│     ConnectionRegistry      │   │
//! │  │  (TCP listener) │     │   (Mutex<HashMap<Id, _>>)   │   │
//! │  └────────┬────────┘     └──────────────▲──────────────┘   │
//! │           │ spawn                       │ remove            │
//! │  ┌────────▼────────────────────────────┴──┐                │
//! │  │   LivenessMonitor (per connection)     │                │
//! │  └────────────────────────────────────────┘                │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Per-datagram and per-connection failures never stop the server

pub mod broadcast;
pub mod config;
pub mod monitor;
pub mod registry;
pub mod server;
pub mod stats;
