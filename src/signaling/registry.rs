use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::types::{ConnectionId, RoomId};

/// Room membership, indexed both ways.
///
/// `rooms` and `memberships` always describe the same set of
/// (room, connection) pairs, and neither map holds an empty set.
#[derive(Debug, Default)]
pub struct Registry {
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
    memberships: HashMap<ConnectionId, HashSet<RoomId>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `conn` to `room`, creating the room when absent.
    ///
    /// Returns the other members present at the time of the call.
    pub fn join(&mut self, room: &RoomId, conn: &ConnectionId) -> Vec<ConnectionId> {
        let members = self.rooms.entry(room.clone()).or_insert_with(|| {
            debug!("Room {} created", room);
            HashSet::new()
        });

        let existing = members.iter().filter(|m| *m != conn).cloned().collect();
        members.insert(conn.clone());

        self.memberships
            .entry(conn.clone())
            .or_default()
            .insert(room.clone());

        existing
    }

    /// Remove `conn` from `room`. Returns whether it was a member.
    pub fn leave(&mut self, room: &RoomId, conn: &ConnectionId) -> bool {
        let Some(members) = self.rooms.get_mut(room) else {
            return false;
        };
        if !members.remove(conn) {
            return false;
        }
        if members.is_empty() {
            self.rooms.remove(room);
            debug!("Room {} removed (empty)", room);
        }

        if let Some(rooms) = self.memberships.get_mut(conn) {
            rooms.remove(room);
            if rooms.is_empty() {
                self.memberships.remove(conn);
            }
        }
        true
    }

    /// Remove `conn` from every room it belongs to.
    ///
    /// Returns each affected room with its remaining member count; rooms
    /// reported with zero have already been deleted.
    pub fn disconnect_all(&mut self, conn: &ConnectionId) -> Vec<(RoomId, usize)> {
        let Some(rooms) = self.memberships.remove(conn) else {
            return Vec::new();
        };

        let mut affected = Vec::with_capacity(rooms.len());
        for room in rooms {
            let Some(members) = self.rooms.get_mut(&room) else {
                continue;
            };
            members.remove(conn);
            let remaining = members.len();
            if remaining == 0 {
                self.rooms.remove(&room);
                debug!("Room {} removed (empty)", room);
            }
            affected.push((room, remaining));
        }
        affected
    }

    /// Current members of `room`; empty when the room does not exist.
    pub fn members(&self, room: &RoomId) -> impl Iterator<Item = &ConnectionId> {
        self.rooms.get(room).into_iter().flatten()
    }

    /// Rooms `conn` currently belongs to.
    pub fn rooms_of(&self, conn: &ConnectionId) -> impl Iterator<Item = &RoomId> {
        self.memberships.get(conn).into_iter().flatten()
    }

    pub fn contains_room(&self, room: &RoomId) -> bool {
        self.rooms.contains_key(room)
    }

    pub fn is_member(&self, room: &RoomId, conn: &ConnectionId) -> bool {
        self.rooms.get(room).is_some_and(|m| m.contains(conn))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of connections that belong to at least one room
    pub fn connection_count(&self) -> usize {
        self.memberships.len()
    }

    /// Total (room, connection) pairs
    pub fn membership_count(&self) -> usize {
        self.rooms.values().map(HashSet::len).sum()
    }
}
