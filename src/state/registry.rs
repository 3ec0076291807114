use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::state::room::Room;

/// Maps session codes to their live broadcast rooms.
///
/// Rooms are created implicitly the first time a connection joins a code and
/// garbage-collected once they are empty and the underlying session is no
/// longer active. Each room is fully independent; the registry itself holds
/// no cross-room state.
pub struct SessionRegistry {
    rooms: DashMap<String, Arc<Room>>,
    transition_timeout: Option<Duration>,
}

impl SessionRegistry {
    /// Create an empty registry; `transition_timeout` bounds the durable work
    /// of every planned transition in every room.
    pub fn new(transition_timeout: Option<Duration>) -> Self {
        Self {
            rooms: DashMap::new(),
            transition_timeout,
        }
    }

    /// Room for `code`, created on first use.
    pub fn room(&self, code: &str) -> Arc<Room> {
        self.rooms
            .entry(code.to_owned())
            .or_insert_with(|| Arc::new(Room::new(code.to_owned(), self.transition_timeout)))
            .clone()
    }

    /// Room for `code` if one exists.
    pub fn get(&self, code: &str) -> Option<Arc<Room>> {
        self.rooms.get(code).map(|entry| entry.clone())
    }

    /// Drop the room for `code` when no connection is subscribed anymore.
    /// Callers invoke this after a leave or disconnect once the durable
    /// session is known to be inactive.
    pub fn remove_if_empty(&self, code: &str) {
        self.rooms
            .remove_if(code, |_, room| room.is_empty());
    }

    /// Number of live rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether no room is live.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::*;
    use crate::state::room::RoomConnection;

    #[test]
    fn room_created_on_first_use_and_reused() {
        let registry = SessionRegistry::new(None);
        let first = registry.room("123456");
        let second = registry.room("123456");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_if_empty_keeps_occupied_rooms() {
        let registry = SessionRegistry::new(None);
        let room = registry.room("123456");
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn_id = Uuid::new_v4();
        room.join(RoomConnection { id: conn_id, tx });

        registry.remove_if_empty("123456");
        assert_eq!(registry.len(), 1);

        room.leave(conn_id);
        registry.remove_if_empty("123456");
        assert!(registry.is_empty());
    }
}
