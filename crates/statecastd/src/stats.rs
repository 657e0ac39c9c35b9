//! Relay counters.
//!
//! Lock-free counters updated from the hot paths and read by the process
//! monitor. They are observability only: no relay decision reads them.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the ingestion loop, broadcaster and admission loop.
#[derive(Debug, Default)]
pub struct RelayStats {
    datagrams_received: AtomicU64,
    integer_datagrams: AtomicU64,
    receive_errors: AtomicU64,
    broadcasts: AtomicU64,
    messages_delivered: AtomicU64,
    evictions: AtomicU64,
    connections_accepted: AtomicU64,
    connections_rejected: AtomicU64,
    connections_closed: AtomicU64,
}

/// Point-in-time copy of [`RelayStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub datagrams_received: u64,
    pub integer_datagrams: u64,
    pub receive_errors: u64,
    pub broadcasts: u64,
    pub messages_delivered: u64,
    pub evictions: u64,
    pub connections_accepted: u64,
    pub connections_rejected: u64,
    pub connections_closed: u64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_datagram(&self, parsed_integer: bool) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
        if parsed_integer {
            self.integer_datagrams.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_receive_error(&self) {
        self.receive_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self, delivered: usize, evicted: usize) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.messages_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            integer_datagrams: self.integer_datagrams.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
        }
    }
}
