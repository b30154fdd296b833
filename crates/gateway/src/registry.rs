//! Identity-to-connection registry for the live channel.
//!
//! At most one live connection is tracked per identity. A newer
//! connection for the same identity overwrites the older binding, and
//! removal is guarded by the connection id so a stale socket tearing
//! down cannot evict its replacement.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::websocket::ServerEvent;

/// Sending half of one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    conn_id: u64,
    sender: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(conn_id: u64, sender: mpsc::Sender<ServerEvent>) -> Self {
        Self { conn_id, sender }
    }

    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    /// Queue an event for this connection. Delivery is best effort: a
    /// full outbound queue or a closed socket drops the event rather
    /// than blocking the caller.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.sender.try_send(event).is_ok()
    }
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<i64, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an identity to a connection, replacing any previous binding.
    pub async fn register(&self, user_id: i64, handle: ConnectionHandle) {
        let mut connections = self.connections.write().await;
        if let Some(previous) = connections.insert(user_id, handle) {
            debug!(
                user_id,
                replaced_conn = previous.conn_id(),
                "replaced live connection binding"
            );
        }
    }

    /// Remove the binding for an identity, but only if it still belongs
    /// to the given connection. Returns `true` when a binding was removed.
    pub async fn unregister(&self, user_id: i64, conn_id: u64) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get(&user_id) {
            Some(current) if current.conn_id() == conn_id => {
                connections.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    pub(crate) async fn get(&self, user_id: i64) -> Option<ConnectionHandle> {
        self.connections.read().await.get(&user_id).cloned()
    }

    pub(crate) async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub(crate) async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}
