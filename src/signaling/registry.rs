use std::collections::HashMap;
use std::collections::hash_map::Entry;

use thiserror::Error;

use super::types::{ConnId, Password, Room, RoomName};

/// Returned when a room is created over an existing name. The coordinator
/// checks existence before creating, so hitting this is a logic error.
#[derive(Debug, Error)]
#[error("room already exists: {0}")]
pub(crate) struct DuplicateRoom(pub RoomName);

/// Name-keyed store of rooms. All access is serialized by the session actor;
/// the registry itself carries no locking.
#[derive(Debug, Default)]
pub(crate) struct RoomRegistry {
    rooms: HashMap<RoomName, Room>,
}

impl RoomRegistry {
    pub fn create(
        &mut self,
        name: RoomName,
        password: Password,
        callee: ConnId,
    ) -> Result<&mut Room, DuplicateRoom> {
        match self.rooms.entry(name) {
            Entry::Occupied(entry) => Err(DuplicateRoom(entry.key().clone())),
            Entry::Vacant(entry) => Ok(entry.insert(Room::new(password, callee))),
        }
    }

    pub fn get(&self, name: &RoomName) -> Option<&Room> {
        self.rooms.get(name)
    }

    pub fn get_mut(&mut self, name: &RoomName) -> Option<&mut Room> {
        self.rooms.get_mut(name)
    }

    /// Remove the room; a no-op when the name is absent.
    pub fn delete(&mut self, name: &RoomName) {
        self.rooms.remove(name);
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
