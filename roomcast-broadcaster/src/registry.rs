use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::client::{ClientHandle, ClientId};

/// Read-only view of which local clients are in which room
pub trait RoomRegistry: Send + Sync {
    /// Local members of `room`; unknown rooms yield an empty list.
    fn clients_in(&self, room: &str) -> Vec<Arc<dyn ClientHandle>>;
}

type Members = HashMap<ClientId, Arc<dyn ClientHandle>>;

/// Thread-safe in-memory room membership
#[derive(Default)]
pub struct MemoryRoomRegistry {
    rooms: RwLock<HashMap<String, Members>>,
}

impl MemoryRoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add client to room
    pub fn join(&self, room: &str, client: Arc<dyn ClientHandle>) {
        let mut rooms = self.rooms.write();
        let members = rooms.entry(room.to_string()).or_default();
        members.insert(client.id(), client);
        tracing::debug!("Client joined '{}'. Members: {}", room, members.len());
    }

    /// Remove client from room, dropping the room once it is empty.
    /// Returns false if the client was not a member.
    pub fn leave(&self, room: &str, client_id: &ClientId) -> bool {
        let mut rooms = self.rooms.write();
        let Some(members) = rooms.get_mut(room) else {
            return false;
        };
        let removed = members.remove(client_id).is_some();
        if members.is_empty() {
            rooms.remove(room);
        }
        removed
    }

    /// Remove client from every room (disconnect)
    pub fn leave_all(&self, client_id: &ClientId) {
        let mut rooms = self.rooms.write();
        rooms.retain(|_, members| {
            members.remove(client_id);
            !members.is_empty()
        });
    }

    /// Number of non-empty rooms
    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }
}

impl RoomRegistry for MemoryRoomRegistry {
    fn clients_in(&self, room: &str) -> Vec<Arc<dyn ClientHandle>> {
        self.rooms
            .read()
            .get(room)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }
}
