//! Room membership for conversation-scoped broadcast.
//!
//! A room is keyed by the conversation's public id and holds the live
//! connections that explicitly joined it. Broadcasting to a room that
//! nobody joined is a no-op, never an error.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::registry::ConnectionHandle;
use crate::websocket::ServerEvent;

#[derive(Clone, Default)]
pub struct RoomMembership {
    rooms: Arc<RwLock<HashMap<String, HashMap<i64, ConnectionHandle>>>>,
}

impl RoomMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room. Joining a room twice keeps the
    /// newest handle.
    pub async fn join(&self, room: &str, user_id: i64, handle: ConnectionHandle) {
        let mut rooms = self.rooms.write().await;
        rooms.entry(room.to_string()).or_default().insert(user_id, handle);
        debug!(room, user_id, "joined room");
    }

    /// Remove a member from a room if the membership still belongs to
    /// the given connection.
    pub async fn leave(&self, room: &str, user_id: i64, conn_id: u64) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(room) {
            if members.get(&user_id).map(ConnectionHandle::conn_id) == Some(conn_id) {
                members.remove(&user_id);
                debug!(room, user_id, "left room");
            }
            if members.is_empty() {
                rooms.remove(room);
            }
        }
    }

    /// Drop every membership held by the given connection. Used when a
    /// socket closes without leaving its rooms first.
    pub async fn leave_all(&self, user_id: i64, conn_id: u64) {
        let mut rooms = self.rooms.write().await;
        rooms.retain(|_, members| {
            if members.get(&user_id).map(ConnectionHandle::conn_id) == Some(conn_id) {
                members.remove(&user_id);
            }
            !members.is_empty()
        });
    }

    /// Deliver an event to every member of a room, including the
    /// sender's own connection. Returns the number of queued deliveries.
    pub async fn broadcast(&self, room: &str, event: ServerEvent) -> usize {
        let rooms = self.rooms.read().await;
        let Some(members) = rooms.get(room) else {
            return 0;
        };
        members
            .values()
            .filter(|handle| handle.send(event.clone()))
            .count()
    }

    /// Deliver an event to every member of a room except one identity.
    pub async fn broadcast_except(&self, room: &str, except: i64, event: ServerEvent) -> usize {
        let rooms = self.rooms.read().await;
        let Some(members) = rooms.get(room) else {
            return 0;
        };
        members
            .iter()
            .filter(|(user_id, _)| **user_id != except)
            .filter(|(_, handle)| handle.send(event.clone()))
            .count()
    }

    pub async fn member_count(&self, room: &str) -> usize {
        self.rooms
            .read()
            .await
            .get(room)
            .map(HashMap::len)
            .unwrap_or(0)
    }
}
