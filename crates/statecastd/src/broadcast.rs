//! Broadcast engine.
//!
//! Delivers one payload to every connection in the registry. A connection
//! whose write fails, or does not complete within the write timeout, is
//! evicted: removed from the registry and closed before `broadcast` returns.
//!
//! Writes go out one connection at a time over a snapshot, so eviction in the
//! middle of a pass is safe and the registry lock is never held across a
//! write. The write timeout bounds how long one stalled peer can hold up the
//! rest of the pass.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::DEFAULT_WRITE_TIMEOUT;
use crate::registry::ConnectionRegistry;
use crate::stats::RelayStats;

/// Outcome of a single broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections in the snapshot
    pub recipients: usize,

    /// Connections that received the whole payload
    pub delivered: usize,

    /// Connections evicted because the write failed
    pub evicted: usize,
}

/// Fans payloads out to the registered connections.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: ConnectionRegistry,
    write_timeout: Duration,
    stats: Arc<RelayStats>,
}

impl Broadcaster {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self {
            registry,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            stats: Arc::new(RelayStats::new()),
        }
    }

    /// Sets the per-connection write timeout.
    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Shares a stats block with the rest of the server.
    pub fn with_stats(mut self, stats: Arc<RelayStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Writes `payload` to every registered connection.
    ///
    /// The payload is sent as-is; callers supply the trailing delimiter.
    pub async fn broadcast(&self, payload: &[u8]) -> BroadcastReport {
        let recipients = self.registry.snapshot().await;
        let mut report = BroadcastReport {
            recipients: recipients.len(),
            ..BroadcastReport::default()
        };

        for conn in recipients {
            match conn.write_message(payload, self.write_timeout).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    debug!(
                        connection_id = %conn.id(),
                        peer = %conn.peer_addr(),
                        error = %e,
                        "Evicting connection after failed write"
                    );
                    self.registry.remove(conn.id()).await;
                    // Already closed by its liveness monitor when close() is false.
                    if conn.close().await {
                        self.stats.record_closed();
                    }
                    report.evicted += 1;
                }
            }
        }

        self.stats.record_broadcast(report.delivered, report.evicted);
        report
    }
}
