//! Registry of live validator connections.
//!
//! One entry per signed-up connection, owned exclusively by this module.
//! The dispatch scheduler iterates a snapshot so a disconnect mid-pass can
//! never invalidate what it is walking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use watchpost::wire::ValidatorFrame;

/// Opaque handle identifying one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

/// One live, signed-up validator connection.
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub connection_id: ConnectionId,
    pub validator_id: Uuid,
    /// Hex-encoded public key as confirmed at signup; replies are verified
    /// against this, never against what the reply claims.
    pub public_key: String,
    /// Outbound frame channel for this connection's writer task
    pub sender: mpsc::UnboundedSender<ValidatorFrame>,
}

/// Live connection set, safe under concurrent signup/disconnect and
/// scheduler iteration.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, ConnectionEntry>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self { connections: RwLock::new(HashMap::new()), next_id: AtomicU64::new(1) }
    }

    /// Register a signed-up connection. Returns the handle used to
    /// unregister it on disconnect.
    pub fn register(
        &self,
        validator_id: Uuid,
        public_key: String,
        sender: mpsc::UnboundedSender<ValidatorFrame>,
    ) -> ConnectionId {
        let connection_id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = ConnectionEntry { connection_id, validator_id, public_key, sender };

        let mut connections = self.connections.write().unwrap_or_else(|e| e.into_inner());
        connections.insert(connection_id, entry);
        connection_id
    }

    /// Remove a connection. No-op if it was never registered (a socket
    /// that dropped before completing signup).
    pub fn unregister(&self, connection_id: ConnectionId) {
        let mut connections = self.connections.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = connections.remove(&connection_id) {
            tracing::info!("Validator {} disconnected", entry.validator_id);
        }
    }

    /// Copy-on-iterate snapshot of the live set.
    pub fn snapshot(&self) -> Vec<ConnectionEntry> {
        let connections = self.connections.read().unwrap_or_else(|e| e.into_inner());
        connections.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.connections.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
