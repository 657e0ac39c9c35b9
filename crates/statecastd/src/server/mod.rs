//! Relay server.
//!
//! The server:
//! - Takes one bound datagram socket and one bound stream listener
//! - Runs the admission loop on its own task
//! - Runs the ingestion loop on the caller's task
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                         ┌─────────────────┐
//! │  IngestionLoop  │                         │  AdmissionLoop  │
//! │   (UdpSocket)   │                         │  (TcpListener)  │
//! └───────┬─────────┘                         └───────┬─────────┘
//!         │ StateCell + annotate                      │ try_add / spawn
//!         ▼                                           ▼
//! ┌─────────────────┐   snapshot / remove    ┌──────────────────────┐
//! │   Broadcaster   │───────────────────────▶│  ConnectionRegistry  │
//! └─────────────────┘                        └──────────▲───────────┘
//!                                                       │ remove on EOF
//!                                            ┌──────────┴───────────┐
//!                                            │  LivenessMonitor     │
//!                                            │  (per connection)    │
//!                                            └──────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Only binding the two endpoints can fail; every later error is logged
//!   and isolated to the datagram or connection that caused it

mod admission;
mod ingest;
mod liveness;

pub use admission::AdmissionLoop;
pub use ingest::{DatagramRelay, IngestionLoop, RelayOutcome};
pub use liveness::{DisconnectReason, LivenessMonitor};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::broadcast::Broadcaster;
use crate::config::RelayConfig;
use crate::registry::ConnectionRegistry;
use crate::stats::RelayStats;

/// UDP to TCP relay server.
pub struct RelayServer {
    udp: UdpSocket,
    tcp: TcpListener,
    config: RelayConfig,

    /// Active stream connections
    registry: ConnectionRegistry,

    stats: Arc<RelayStats>,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,
}

impl RelayServer {
    /// Creates a server over two already-bound endpoints.
    ///
    /// The listen addresses in `config` are ignored; the remaining settings
    /// (admission cap, write timeout, buffer size) apply.
    pub fn new(
        udp: UdpSocket,
        tcp: TcpListener,
        config: RelayConfig,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            udp,
            tcp,
            config,
            registry: ConnectionRegistry::new(),
            stats: Arc::new(RelayStats::new()),
            cancel_token,
        }
    }

    /// Binds both endpoints from `config` and creates the server.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if either address cannot be bound.
    pub async fn bind(
        config: RelayConfig,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let tcp = TcpListener::bind(config.tcp_addr)
            .await
            .map_err(|e| ServerError::Bind {
                transport: "TCP",
                addr: config.tcp_addr,
                error: e.to_string(),
            })?;

        let udp = UdpSocket::bind(config.udp_addr)
            .await
            .map_err(|e| ServerError::Bind {
                transport: "UDP",
                addr: config.udp_addr,
                error: e.to_string(),
            })?;

        Ok(Self::new(udp, tcp, config, cancel_token))
    }

    /// Returns a handle to the connection registry.
    pub fn registry(&self) -> ConnectionRegistry {
        self.registry.clone()
    }

    pub fn stats(&self) -> Arc<RelayStats> {
        Arc::clone(&self.stats)
    }

    pub fn udp_local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.udp
            .local_addr()
            .map_err(|e| ServerError::LocalAddr(e.to_string()))
    }

    pub fn tcp_local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.tcp
            .local_addr()
            .map_err(|e| ServerError::LocalAddr(e.to_string()))
    }

    /// Runs the relay until the cancellation token is triggered.
    ///
    /// On shutdown every registered connection is closed. Returns the final
    /// accumulated state.
    pub async fn run(self) -> Result<i64, ServerError> {
        let udp_addr = self.udp_local_addr()?;
        let tcp_addr = self.tcp_local_addr()?;

        info!(
            udp = %udp_addr,
            tcp = %tcp_addr,
            max_connections = self.config.max_connections,
            "Relay server listening"
        );

        let admission = AdmissionLoop::new(
            self.tcp,
            self.registry.clone(),
            Arc::clone(&self.stats),
            self.cancel_token.clone(),
        )
        .with_max_connections(self.config.max_connections);
        let admission_handle = tokio::spawn(admission.run());

        let broadcaster = Broadcaster::new(self.registry.clone())
            .with_write_timeout(self.config.write_timeout_duration())
            .with_stats(Arc::clone(&self.stats));

        let state = IngestionLoop::new(self.udp, broadcaster, Arc::clone(&self.stats))
            .with_buffer_size(self.config.recv_buffer_len())
            .run(self.cancel_token.clone())
            .await;

        info!("Server shutdown requested");

        // Stop the admission loop too if ingestion ended first.
        self.cancel_token.cancel();
        if let Err(e) = admission_handle.await {
            warn!(error = %e, "Admission loop ended abnormally");
        }

        let closed = self.registry.close_all().await;
        info!(
            closed_connections = closed,
            final_state = state.value(),
            "Server cleanup complete"
        );

        Ok(state.value())
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {transport} listener on {addr}: {error}")]
    Bind {
        transport: &'static str,
        addr: SocketAddr,
        error: String,
    },

    #[error("Failed to read local address: {0}")]
    LocalAddr(String),
}
