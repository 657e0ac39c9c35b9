//! Shared helpers for the relay integration tests.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use statecastd::config::RelayConfig;
use statecastd::registry::ConnectionRegistry;
use statecastd::server::{RelayServer, ServerError};
use statecastd::stats::RelayStats;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound for anything the tests wait on
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between registry polls
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Test Server
// ============================================================================

/// Relay bound to loopback ephemeral ports, plus a UDP sender.
pub struct TestServer {
    pub udp_addr: SocketAddr,
    pub tcp_addr: SocketAddr,
    pub registry: ConnectionRegistry,
    pub stats: Arc<RelayStats>,
    pub sender: UdpSocket,
    cancel_token: CancellationToken,
    handle: JoinHandle<Result<i64, ServerError>>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        Self::spawn_with(RelayConfig::default()).await
    }

    pub async fn spawn_with(config: RelayConfig) -> Self {
        let config = config.bind("127.0.0.1:0".parse().unwrap());
        let cancel_token = CancellationToken::new();

        let server = RelayServer::bind(config, cancel_token.clone())
            .await
            .expect("bind relay");
        let udp_addr = server.udp_local_addr().unwrap();
        let tcp_addr = server.tcp_local_addr().unwrap();
        let registry = server.registry();
        let stats = server.stats();

        let handle = tokio::spawn(server.run());

        let sender = UdpSocket::bind("127.0.0.1:0").await.expect("bind sender");

        TestServer {
            udp_addr,
            tcp_addr,
            registry,
            stats,
            sender,
            cancel_token,
            handle,
        }
    }

    /// Address the relay sees datagrams from.
    pub fn sender_addr(&self) -> SocketAddr {
        self.sender.local_addr().unwrap()
    }

    /// Opens a TCP client without waiting for registration.
    pub async fn connect_raw(&self) -> TestClient {
        let stream = TcpStream::connect(self.tcp_addr)
            .await
            .expect("connect to relay");
        TestClient::new(stream)
    }

    /// Opens a TCP client and waits until the registry holds `expected_total`.
    pub async fn connect(&self, expected_total: usize) -> TestClient {
        let client = self.connect_raw().await;
        self.wait_for_connections(expected_total).await;
        client
    }

    /// Polls until the registry holds exactly `expected` connections.
    pub async fn wait_for_connections(&self, expected: usize) {
        let start = Instant::now();
        loop {
            let current = self.registry.len().await;
            if current == expected {
                return;
            }
            assert!(
                start.elapsed() < WAIT_TIMEOUT,
                "registry held {current} connections, expected {expected}"
            );
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Sends one datagram to the relay.
    pub async fn send(&self, payload: &[u8]) {
        self.sender
            .send_to(payload, self.udp_addr)
            .await
            .expect("send datagram");
    }

    /// The line every client should receive for `payload` at `state`.
    pub fn expected_line(&self, state: i64, payload: &str) -> String {
        format!("[from {}] state: {state}{payload}\n", self.sender_addr())
    }

    /// Cancels the server and returns its final state.
    pub async fn shutdown(self) -> i64 {
        self.cancel_token.cancel();
        timeout(WAIT_TIMEOUT, self.handle)
            .await
            .expect("server stops")
            .expect("server task")
            .expect("server result")
    }
}

// ============================================================================
// Test Client
// ============================================================================

pub struct TestClient {
    pub reader: BufReader<OwnedReadHalf>,
    pub writer: OwnedWriteHalf,
}

impl TestClient {
    pub fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Reads one newline-terminated message.
    pub async fn recv_line(&mut self) -> String {
        let mut line = String::new();
        let n = timeout(WAIT_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("line within timeout")
            .expect("read line");
        assert!(n > 0, "connection closed while waiting for a line");
        line
    }

    /// Returns true if the server closes the connection within the timeout.
    pub async fn expect_eof(&mut self) -> bool {
        let mut buf = Vec::new();
        match timeout(WAIT_TIMEOUT, self.reader.read_to_end(&mut buf)).await {
            Ok(Ok(_)) => true,
            // Reset by peer also counts as closed
            Ok(Err(_)) => true,
            Err(_) => false,
        }
    }

    /// Returns true if nothing arrives within `window`.
    pub async fn is_quiet_for(&mut self, window: Duration) -> bool {
        let mut line = String::new();
        timeout(window, self.reader.read_line(&mut line)).await.is_err()
    }

    pub async fn send_raw(&mut self, data: &[u8]) {
        self.writer.write_all(data).await.unwrap();
        self.writer.flush().await.unwrap();
    }
}
