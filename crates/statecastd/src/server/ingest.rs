//! Ingestion loop.
//!
//! Receives datagrams, folds integer payloads into the state cell and
//! broadcasts one annotated line per datagram. No datagram and no receive
//! error ends the loop; only cancellation does.

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use statecast_core::{Datagram, StateCell};

use crate::broadcast::{BroadcastReport, Broadcaster};
use crate::config::DEFAULT_RECV_BUFFER_SIZE;
use crate::stats::RelayStats;

/// Result of relaying one datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOutcome {
    /// State value embedded in the broadcast (after any update)
    pub state: i64,

    /// Whether the payload parsed as an integer and changed the state
    pub updated: bool,

    pub report: BroadcastReport,
}

/// Per-datagram relay logic, independent of the socket.
///
/// Owns the [`StateCell`]: this is its only writer and its only reader.
#[derive(Debug)]
pub struct DatagramRelay {
    state: StateCell,
    broadcaster: Broadcaster,
    stats: Arc<RelayStats>,
}

impl DatagramRelay {
    pub fn new(broadcaster: Broadcaster, stats: Arc<RelayStats>) -> Self {
        Self {
            state: StateCell::new(),
            broadcaster,
            stats,
        }
    }

    /// Current accumulated state.
    pub fn state(&self) -> i64 {
        self.state.value()
    }

    /// Updates the state from one datagram and broadcasts its annotated form.
    pub async fn relay(&mut self, datagram: Datagram<'_>) -> RelayOutcome {
        let updated = match self.state.ingest(datagram.payload) {
            Ok(_) => true,
            Err(reason) => {
                debug!(source = %datagram.source, reason = %reason, "Payload left state unchanged");
                false
            }
        };
        self.stats.record_datagram(updated);

        let state = self.state.value();
        debug!(
            source = %datagram.source,
            payload = %String::from_utf8_lossy(datagram.payload),
            state,
            "Datagram received"
        );

        let message = datagram.annotate(state);
        let report = self.broadcaster.broadcast(&message).await;

        RelayOutcome {
            state,
            updated,
            report,
        }
    }

    /// Consumes the relay, returning the final state.
    pub fn into_state(self) -> StateCell {
        self.state
    }
}

/// Receive loop for the datagram socket.
pub struct IngestionLoop {
    socket: UdpSocket,
    buf: Vec<u8>,
    relay: DatagramRelay,
    stats: Arc<RelayStats>,
}

impl IngestionLoop {
    pub fn new(socket: UdpSocket, broadcaster: Broadcaster, stats: Arc<RelayStats>) -> Self {
        Self {
            socket,
            buf: vec![0u8; DEFAULT_RECV_BUFFER_SIZE],
            relay: DatagramRelay::new(broadcaster, Arc::clone(&stats)),
            stats,
        }
    }

    /// Sets the receive buffer size. Longer datagrams are truncated.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buf = vec![0u8; size.max(1)];
        self
    }

    /// Receives and relays datagrams until the cancellation token fires.
    ///
    /// Returns the final state.
    pub async fn run(mut self, cancel_token: CancellationToken) -> StateCell {
        loop {
            let received = tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    debug!("Ingestion loop shutting down");
                    break;
                }

                result = self.socket.recv_from(&mut self.buf) => result,
            };

            match received {
                Ok((len, source)) => {
                    let payload = self.buf.get(..len).unwrap_or_default();
                    self.relay.relay(Datagram::new(source, payload)).await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to receive datagram");
                    self.stats.record_receive_error();
                }
            }
        }

        self.relay.into_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Connection, ConnectionRegistry};
    use statecast_core::ConnectionId;
    use std::net::SocketAddr;
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream};

    fn source() -> SocketAddr {
        "192.168.1.20:6000".parse().unwrap()
    }

    async fn register(registry: &ConnectionRegistry, id: u64) -> BufReader<DuplexStream> {
        let (client, peer) = tokio::io::duplex(4096);
        let conn = Arc::new(Connection::new(ConnectionId::new(id), source(), client));
        registry.add(conn).await;
        BufReader::new(peer)
    }

    async fn next_line(reader: &mut BufReader<DuplexStream>) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        line
    }

    #[tokio::test]
    async fn test_scenario_sum_with_non_integer() {
        let registry = ConnectionRegistry::new();
        let mut c1 = register(&registry, 1).await;
        let mut c2 = register(&registry, 2).await;
        let mut relay = DatagramRelay::new(Broadcaster::new(registry), Arc::new(RelayStats::new()));

        let mut states = Vec::new();
        for payload in [&b"5"[..], b"7", b"abc", b"3"] {
            let outcome = relay.relay(Datagram::new(source(), payload)).await;
            assert_eq!(outcome.report.delivered, 2);
            states.push(outcome.state);
        }
        assert_eq!(states, vec![5, 12, 12, 15]);

        let expected = [
            "[from 192.168.1.20:6000] state: 55\n",
            "[from 192.168.1.20:6000] state: 127\n",
            "[from 192.168.1.20:6000] state: 12abc\n",
            "[from 192.168.1.20:6000] state: 153\n",
        ];
        for line in expected {
            assert_eq!(next_line(&mut c1).await, line);
            assert_eq!(next_line(&mut c2).await, line);
        }
    }

    #[tokio::test]
    async fn test_non_integer_is_not_an_update() {
        let mut relay = DatagramRelay::new(
            Broadcaster::new(ConnectionRegistry::new()),
            Arc::new(RelayStats::new()),
        );

        let outcome = relay.relay(Datagram::new(source(), b"hello")).await;
        assert!(!outcome.updated);
        assert_eq!(outcome.state, 0);

        let outcome = relay.relay(Datagram::new(source(), b"-4")).await;
        assert!(outcome.updated);
        assert_eq!(relay.state(), -4);
    }

    #[tokio::test]
    async fn test_relay_records_stats() {
        let stats = Arc::new(RelayStats::new());
        let mut relay =
            DatagramRelay::new(Broadcaster::new(ConnectionRegistry::new()), Arc::clone(&stats));

        relay.relay(Datagram::new(source(), b"1")).await;
        relay.relay(Datagram::new(source(), b"x")).await;

        let snap = stats.snapshot();
        assert_eq!(snap.datagrams_received, 2);
        assert_eq!(snap.integer_datagrams, 1);
    }

    #[tokio::test]
    async fn test_ingestion_loop_stops_on_cancel() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = socket.local_addr().unwrap();
        let registry = ConnectionRegistry::new();
        let stats = Arc::new(RelayStats::new());
        let ingest = IngestionLoop::new(socket, Broadcaster::new(registry), Arc::clone(&stats));
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(ingest.run(cancel_token.clone()));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"40", target).await.unwrap();
        sender.send_to(b"2", target).await.unwrap();

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
        while stats.snapshot().datagrams_received < 2 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        cancel_token.cancel();
        let state = handle.await.unwrap();
        assert_eq!(state.value(), 42);
    }
}
