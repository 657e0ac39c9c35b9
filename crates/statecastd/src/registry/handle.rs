//! Shared handle to the set of active connections.
//!
//! `ConnectionRegistry` is cheap to clone and can be shared across the
//! admission loop, every liveness monitor and the broadcaster.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use statecast_core::ConnectionId;

use super::connection::Connection;
use super::error::RegistryError;

type ConnectionMap = HashMap<ConnectionId, Arc<Connection>>;

/// Concurrency-safe set of connections that receive broadcasts.
///
/// Every operation takes the same lock. `add`, `remove` and `contains` are
/// O(1) under the lock; `snapshot` copies the members out so iteration and
/// network writes happen after the lock is released.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<Mutex<ConnectionMap>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a connection.
    ///
    /// Returns `false` without replacing anything if a connection with the
    /// same id is already registered.
    pub async fn add(&self, conn: Arc<Connection>) -> bool {
        let mut connections = self.connections.lock().await;
        let id = conn.id();
        if connections.contains_key(&id) {
            return false;
        }
        connections.insert(id, conn);
        debug!(connection_id = %id, total = connections.len(), "Registered connection");
        true
    }

    /// Inserts a connection unless the registry already holds `max_connections`.
    ///
    /// A `max_connections` of zero means unlimited. The capacity check and the
    /// insert happen under a single lock acquisition.
    ///
    /// # Errors
    ///
    /// - `RegistryError::Full` if the cap is reached
    /// - `RegistryError::AlreadyRegistered` if the id is already present
    pub async fn try_add(
        &self,
        conn: Arc<Connection>,
        max_connections: usize,
    ) -> Result<(), RegistryError> {
        let mut connections = self.connections.lock().await;
        let id = conn.id();

        if connections.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered { id });
        }
        if max_connections > 0 && connections.len() >= max_connections {
            return Err(RegistryError::Full {
                max: max_connections,
            });
        }

        connections.insert(id, conn);
        debug!(connection_id = %id, total = connections.len(), "Registered connection");
        Ok(())
    }

    /// Removes a connection. Idempotent: returns `None` if it was not present.
    pub async fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let removed = self.connections.lock().await.remove(&id);
        if removed.is_some() {
            debug!(connection_id = %id, "Deregistered connection");
        }
        removed
    }

    /// Copies out the current members, in no particular order.
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.lock().await.values().cloned().collect()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.lock().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }

    /// Empties the registry and closes every connection it held.
    ///
    /// Returns the number of connections closed.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<Arc<Connection>> = {
            let mut connections = self.connections.lock().await;
            connections.drain().map(|(_, conn)| conn).collect()
        };

        let count = drained.len();
        for conn in drained {
            conn.close().await;
        }
        count
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry").finish_non_exhaustive()
    }
}
