//! A single registered stream connection.

use std::net::SocketAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use statecast_core::ConnectionId;

use super::error::ConnectionError;

/// Bound on shutting down the write half.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Boxed write half of a connection.
///
/// In the server this is a `tokio::net::tcp::OwnedWriteHalf`; tests plug in
/// in-memory streams.
pub type ConnectionWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The write side of one accepted stream connection.
///
/// The read side lives in the connection's liveness monitor. Closing the
/// connection shuts down the writer and fires [`Connection::closed`], which
/// stops the liveness monitor and so releases the read side as well.
pub struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    connected_at: DateTime<Utc>,

    /// `None` once closed
    writer: Mutex<Option<BufWriter<ConnectionWriter>>>,

    closed: CancellationToken,
}

impl Connection {
    /// Wraps the write half of a freshly accepted connection.
    pub fn new<W>(id: ConnectionId, peer_addr: SocketAddr, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: ConnectionWriter = Box::new(writer);
        Self {
            id,
            peer_addr,
            connected_at: Utc::now(),
            writer: Mutex::new(Some(BufWriter::new(writer))),
            closed: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Time since the connection was accepted.
    pub fn connected_for(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.connected_at)
    }

    /// Returns true once [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Completes when the connection is closed from any path.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Writes one whole message and flushes it, bounded by `write_timeout`.
    ///
    /// Concurrent writers are serialized on the connection's own lock, so a
    /// message is never interleaved with another one.
    pub async fn write_message(
        &self,
        payload: &[u8],
        write_timeout: Duration,
    ) -> Result<(), ConnectionError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ConnectionError::Closed)?;

        match timeout(write_timeout, async {
            writer.write_all(payload).await?;
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        })
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
            Err(_) => Err(ConnectionError::WriteTimeout),
        }
    }

    /// Closes the connection.
    ///
    /// Returns `false` if it was already closed. A write that is in flight
    /// finishes (or times out) before the writer is shut down. Bytes left
    /// buffered by a failed write are discarded, not flushed.
    pub async fn close(&self) -> bool {
        self.closed.cancel();

        let writer = self.writer.lock().await.take();
        match writer {
            Some(writer) => {
                let mut inner = writer.into_inner();
                // Peer may already be gone; nothing useful to do on error.
                let _ = timeout(CLOSE_TIMEOUT, inner.shutdown()).await;
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("connected_at", &self.connected_at)
            .field("closed", &self.is_closed())
            .finish()
    }
}
