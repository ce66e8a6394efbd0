//! Live connection tracking.

use std::sync::Arc;

use dashmap::DashMap;

use super::connection::ClientConnection;

/// Connected clients indexed by connection ID.
///
/// Connections are independent; the registry only exists so the health
/// endpoint and shutdown can see them.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, Arc<ClientConnection>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a connection.
    pub fn add(&self, connection: Arc<ClientConnection>) {
        let _ = self.connections.insert(connection.id.clone(), connection);
    }

    /// Stop tracking a connection.
    pub fn remove(&self, id: &str) -> Option<Arc<ClientConnection>> {
        self.connections.remove(id).map(|(_, conn)| conn)
    }

    /// Look up a connection by ID.
    pub fn get(&self, id: &str) -> Option<Arc<ClientConnection>> {
        self.connections.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of live connections.
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Mark every connection closed so in-flight cycles stop emitting.
    pub fn close_all(&self) {
        for entry in &self.connections {
            entry.value().close();
        }
    }
}
