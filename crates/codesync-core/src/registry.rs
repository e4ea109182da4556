//! Room registry.
//!
//! Maps room identifiers to their participants and each connection to the
//! room it joined. Mutations of one room are serialized by the shard lock of
//! the underlying `DashMap`, and the `*_with` variants run a closure while
//! that lock is still held so callers can enqueue broadcasts in mutation
//! order.

use crate::room::{Room, RoomId};
use codesync_protocol::Participant;
use dashmap::DashMap;
use tracing::{debug, info, trace};

/// A participant that left a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    /// The room that was left.
    pub room: RoomId,
    /// Connection handle of the departed participant.
    pub connection_id: String,
    /// Display name of the departed participant.
    pub display_name: String,
}

/// The shared room registry.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    /// Rooms indexed by identifier. Emptied rooms stay until swept.
    rooms: DashMap<RoomId, Room>,
    /// Connection handle -> room it is registered in.
    memberships: DashMap<String, RoomId>,
}

impl RoomRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a participant in a room, creating the room if absent.
    ///
    /// Returns the full resulting roster. Registering a connection again
    /// replaces its earlier registration.
    pub fn register(&self, room: &str, participant: Participant) -> Vec<Participant> {
        self.register_with(room, participant, Room::snapshot)
    }

    /// Register a participant and run `f` on the room before releasing it.
    pub fn register_with<R>(
        &self,
        room: &str,
        participant: Participant,
        f: impl FnOnce(&Room) -> R,
    ) -> R {
        let connection_id = participant.connection_id.clone();

        // A connection lives in at most one room.
        if let Some(previous) = self.memberships.insert(connection_id.clone(), room.to_string()) {
            if previous != room {
                if let Some(mut old) = self.rooms.get_mut(&previous) {
                    old.remove(&connection_id);
                }
                debug!(connection = %connection_id, from = %previous, to = %room, "Moved between rooms");
            }
        }

        let mut entry = self.rooms.entry(room.to_string()).or_insert_with(|| {
            debug!(room = %room, "Creating room");
            Room::new(room)
        });
        entry.insert(participant);

        trace!(room = %room, connection = %connection_id, participants = entry.len(), "Registered");
        f(&*entry)
    }

    /// Remove a connection from whichever room it joined.
    ///
    /// Returns `None` if the connection was never registered.
    pub fn unregister(&self, connection_id: &str) -> Option<Departure> {
        self.unregister_with(connection_id, |_, _| ())
    }

    /// Unregister a connection and run `f` on the departure and the
    /// remaining room before releasing it.
    pub fn unregister_with(
        &self,
        connection_id: &str,
        f: impl FnOnce(&Departure, &Room),
    ) -> Option<Departure> {
        let (_, room_id) = self.memberships.remove(connection_id)?;
        let mut room = self.rooms.get_mut(&room_id)?;
        let participant = room.remove(connection_id)?;

        let departure = Departure {
            room: room_id,
            connection_id: participant.connection_id,
            display_name: participant.display_name,
        };
        trace!(room = %departure.room, connection = %connection_id, remaining = room.len(), "Unregistered");

        f(&departure, &*room);
        Some(departure)
    }

    /// Snapshot of a room's roster. Unknown rooms are empty.
    #[must_use]
    pub fn list_participants(&self, room: &str) -> Vec<Participant> {
        self.with_room(room, Room::snapshot).unwrap_or_default()
    }

    /// Run `f` on a room under its shard lock.
    pub fn with_room<R>(&self, room: &str, f: impl FnOnce(&Room) -> R) -> Option<R> {
        self.rooms.get(room).map(|entry| f(entry.value()))
    }

    /// The room a connection is registered in.
    #[must_use]
    pub fn room_of(&self, connection_id: &str) -> Option<RoomId> {
        self.memberships.get(connection_id).map(|r| r.value().clone())
    }

    /// A room exists while it has participants.
    #[must_use]
    pub fn room_exists(&self, room: &str) -> bool {
        self.rooms.get(room).is_some_and(|r| !r.is_empty())
    }

    /// Number of participants in a room.
    #[must_use]
    pub fn participant_count(&self, room: &str) -> usize {
        self.rooms.get(room).map(|r| r.len()).unwrap_or(0)
    }

    /// Drop entries for rooms that have emptied.
    ///
    /// Returns the number of rooms removed.
    pub fn sweep_empty_rooms(&self) -> usize {
        let mut removed = 0;
        self.rooms.retain(|id, room| {
            if room.is_empty() {
                debug!(room = %id, "Sweeping empty room");
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            info!(removed, remaining = self.rooms.len(), "Swept empty rooms");
        }
        removed
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            room_count: 0,
            occupied_rooms: 0,
            participant_count: 0,
        };
        for room in self.rooms.iter() {
            stats.room_count += 1;
            if !room.is_empty() {
                stats.occupied_rooms += 1;
            }
            stats.participant_count += room.len();
        }
        stats
    }
}

/// Registry statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    /// Room entries, including emptied rooms not yet swept.
    pub room_count: usize,
    /// Rooms with at least one participant.
    pub occupied_rooms: usize,
    /// Total participants over all rooms.
    pub participant_count: usize,
}
