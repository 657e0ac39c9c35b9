//! Admission loop.
//!
//! Accepts stream connections, registers them and starts their liveness
//! monitors:
//!
//! ```text
//! Listening ──accept()──▶ Accepted ──try_add()──▶ Registered ──spawn──▶ Monitoring
//!     ▲                      │
//!     └──── accept error ────┘ (logged, keep listening)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use statecast_core::ConnectionId;

use crate::registry::{Connection, ConnectionRegistry};
use crate::stats::RelayStats;

use super::liveness::LivenessMonitor;

/// Accept loop for the stream listener.
pub struct AdmissionLoop {
    listener: TcpListener,
    registry: ConnectionRegistry,
    stats: Arc<RelayStats>,
    cancel_token: CancellationToken,

    /// 0 = unlimited
    max_connections: usize,

    /// Counter for connection ids
    next_id: u64,
}

impl AdmissionLoop {
    pub fn new(
        listener: TcpListener,
        registry: ConnectionRegistry,
        stats: Arc<RelayStats>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            listener,
            registry,
            stats,
            cancel_token,
            max_connections: 0,
            next_id: 0,
        }
    }

    /// Caps the number of registered connections (0 = unlimited).
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Accepts connections until the cancellation token fires.
    ///
    /// Accept errors are logged and never end the loop.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    debug!("Admission loop shutting down");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            self.admit(stream, peer_addr).await;
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Continue accepting other connections
                        }
                    }
                }
            }
        }
    }

    async fn admit(&mut self, stream: TcpStream, peer_addr: SocketAddr) {
        let id = ConnectionId::new(self.next_id);
        self.next_id += 1;

        if let Err(e) = stream.set_nodelay(true) {
            debug!(connection_id = %id, error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let conn = Arc::new(Connection::new(id, peer_addr, writer));

        if let Err(e) = self
            .registry
            .try_add(Arc::clone(&conn), self.max_connections)
            .await
        {
            warn!(peer = %peer_addr, error = %e, "Connection rejected");
            self.stats.record_rejected();
            // Dropping both halves closes the socket.
            return;
        }

        self.stats.record_accepted();
        info!(connection_id = %id, peer = %peer_addr, "Client connected");

        LivenessMonitor::new(
            conn,
            self.registry.clone(),
            Arc::clone(&self.stats),
            self.cancel_token.clone(),
        )
        .spawn(reader);
    }
}
