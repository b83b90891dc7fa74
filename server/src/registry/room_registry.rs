use dashmap::{mapref::entry::Entry, DashMap};
use thiserror::Error;

use super::connection_handle::ConnectionHandle;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("room '{room}' not found")]
    RoomNotFound { room: String },
    #[error("connection '{connection_id}' is not a member of room '{room}'")]
    NotAMember { room: String, connection_id: String },
}

#[derive(Debug, Default)]
/// [RoomRegistry] keeps track of which connections are in which room
///
/// A room exists only while it has members: it is created by the first join
/// and removed together with its last member. Every operation on a room holds
/// the lock of that room's entry, so a broadcast never sees a member list in
/// the middle of a join or leave.
pub struct RoomRegistry {
    rooms: DashMap<String, Vec<ConnectionHandle>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        RoomRegistry {
            rooms: DashMap::new(),
        }
    }

    /// Add a connection to the room, creating the room if needed.
    /// Returns false and does nothing if the connection is already in the room
    pub fn join(&self, room: &str, connection: ConnectionHandle) -> bool {
        let mut members = self.rooms.entry(String::from(room)).or_default();

        if members.contains(&connection) {
            return false;
        }

        members.push(connection);

        true
    }

    /// Remove a connection from the room, the room is dropped once it is empty
    ///
    /// A connection only leaves a room it has joined, so an error here means
    /// the caller's bookkeeping is broken.
    pub fn leave(&self, room: &str, connection: &ConnectionHandle) -> Result<(), RegistryError> {
        let mut entry = match self.rooms.entry(String::from(room)) {
            Entry::Occupied(entry) => entry,
            Entry::Vacant(_) => {
                return Err(RegistryError::RoomNotFound {
                    room: String::from(room),
                })
            }
        };

        let members = entry.get_mut();
        let position = members
            .iter()
            .position(|member| member == connection)
            .ok_or_else(|| RegistryError::NotAMember {
                room: String::from(room),
                connection_id: String::from(connection.id()),
            })?;

        members.remove(position);

        if members.is_empty() {
            entry.remove();
        }

        Ok(())
    }

    /// Snapshot of the room's members in join order, empty if the room does not exist
    pub fn members_of(&self, room: &str) -> Vec<ConnectionHandle> {
        self.rooms
            .get(room)
            .map(|members| members.value().clone())
            .unwrap_or_default()
    }

    pub fn contains_room(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn connection_count(&self) -> usize {
        self.rooms.iter().map(|members| members.value().len()).sum()
    }
}
