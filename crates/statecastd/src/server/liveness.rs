//! Per-connection liveness monitor.
//!
//! Holds the read side of one connection and reads from it only to notice
//! when the peer goes away. Whatever the peer sends is discarded. When the
//! read side reports EOF or an error, when the connection is closed from
//! the broadcast side, or on server shutdown, the monitor deregisters the
//! connection and closes it.

use std::fmt;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::registry::{Connection, ConnectionRegistry};
use crate::stats::RelayStats;

/// Scratch buffer size for discarded input.
const DISCARD_BUFFER_SIZE: usize = 512;

/// Why a liveness monitor stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Peer closed its side
    Eof,

    /// Read failed
    ReadError(String),

    /// Connection was closed by another path (broadcast eviction)
    Closed,

    /// Server is shutting down
    Shutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eof => write!(f, "peer closed connection"),
            Self::ReadError(e) => write!(f, "read error: {e}"),
            Self::Closed => write!(f, "evicted"),
            Self::Shutdown => write!(f, "server shutdown"),
        }
    }
}

/// Watches one connection for disconnects.
pub struct LivenessMonitor {
    conn: Arc<Connection>,
    registry: ConnectionRegistry,
    stats: Arc<RelayStats>,
    cancel_token: CancellationToken,
}

impl LivenessMonitor {
    pub fn new(
        conn: Arc<Connection>,
        registry: ConnectionRegistry,
        stats: Arc<RelayStats>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            conn,
            registry,
            stats,
            cancel_token,
        }
    }

    /// Spawns the monitor on its own task.
    pub fn spawn<R>(self, reader: R) -> JoinHandle<DisconnectReason>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        tokio::spawn(self.run(reader))
    }

    /// Reads until the connection ends, then deregisters and closes it.
    pub async fn run<R>(self, mut reader: R) -> DisconnectReason
    where
        R: AsyncRead + Unpin,
    {
        let mut scratch = [0u8; DISCARD_BUFFER_SIZE];

        let reason = loop {
            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => break DisconnectReason::Shutdown,

                _ = self.conn.closed() => break DisconnectReason::Closed,

                result = reader.read(&mut scratch) => match result {
                    Ok(0) => break DisconnectReason::Eof,
                    Ok(n) => {
                        debug!(connection_id = %self.conn.id(), bytes = n, "Discarded client input");
                    }
                    Err(e) => break DisconnectReason::ReadError(e.to_string()),
                },
            }
        };

        self.registry.remove(self.conn.id()).await;
        if self.conn.close().await {
            self.stats.record_closed();
        }

        info!(
            connection_id = %self.conn.id(),
            peer = %self.conn.peer_addr(),
            connected_secs = self.conn.connected_for().num_seconds(),
            reason = %reason,
            "Client disconnected"
        );

        reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statecast_core::ConnectionId;
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, DuplexStream};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    struct Fixture {
        conn: Arc<Connection>,
        registry: ConnectionRegistry,
        cancel_token: CancellationToken,
        /// Peer's end of the connection's write half
        _peer_read: DuplexStream,
        /// Peer's end of the connection's read half
        peer_write: DuplexStream,
        /// Read half handed to the monitor
        reader: DuplexStream,
    }

    async fn fixture() -> Fixture {
        let (write_half, peer_read) = tokio::io::duplex(1024);
        let (reader, peer_write) = tokio::io::duplex(1024);
        let conn = Arc::new(Connection::new(
            ConnectionId::new(1),
            "127.0.0.1:41000".parse().unwrap(),
            write_half,
        ));
        let registry = ConnectionRegistry::new();
        registry.add(Arc::clone(&conn)).await;

        Fixture {
            conn,
            registry,
            cancel_token: CancellationToken::new(),
            _peer_read: peer_read,
            peer_write,
            reader,
        }
    }

    fn monitor(f: &Fixture) -> LivenessMonitor {
        LivenessMonitor::new(
            Arc::clone(&f.conn),
            f.registry.clone(),
            Arc::new(RelayStats::new()),
            f.cancel_token.clone(),
        )
    }

    #[tokio::test]
    async fn test_peer_eof_deregisters_and_closes() {
        let f = fixture().await;
        let handle = monitor(&f).spawn(f.reader);

        drop(f.peer_write);

        let reason = timeout(WAIT, handle).await.unwrap().unwrap();
        assert_eq!(reason, DisconnectReason::Eof);
        assert!(f.registry.is_empty().await);
        assert!(f.conn.is_closed());
    }

    #[tokio::test]
    async fn test_input_is_discarded_until_eof() {
        let mut f = fixture().await;
        let handle = monitor(&f).spawn(f.reader);

        f.peer_write.write_all(b"ignored input\n").await.unwrap();
        tokio::task::yield_now().await;
        assert!(f.registry.contains(ConnectionId::new(1)).await);

        drop(f.peer_write);
        let reason = timeout(WAIT, handle).await.unwrap().unwrap();
        assert_eq!(reason, DisconnectReason::Eof);
        assert!(f.registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_close_from_broadcast_side_stops_monitor() {
        let f = fixture().await;
        let handle = monitor(&f).spawn(f.reader);

        f.registry.remove(f.conn.id()).await;
        f.conn.close().await;

        let reason = timeout(WAIT, handle).await.unwrap().unwrap();
        assert_eq!(reason, DisconnectReason::Closed);
        assert!(f.registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_shutdown_stops_monitor() {
        let f = fixture().await;
        let handle = monitor(&f).spawn(f.reader);

        f.cancel_token.cancel();

        let reason = timeout(WAIT, handle).await.unwrap().unwrap();
        assert_eq!(reason, DisconnectReason::Shutdown);
        assert!(f.conn.is_closed());
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(DisconnectReason::Eof.to_string(), "peer closed connection");
        assert!(DisconnectReason::ReadError("reset".into())
            .to_string()
            .contains("reset"));
    }
}
