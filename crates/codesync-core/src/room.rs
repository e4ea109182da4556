//! Room abstraction.
//!
//! A room is a named group of participants sharing one document. Rooms have
//! no owner; they come into existence on the first join.

use codesync_protocol::Participant;
use tracing::debug;

/// A room identifier. Opaque and never validated.
pub type RoomId = String;

/// The participants of one room, in join order and unique by connection.
#[derive(Debug, Clone)]
pub struct Room {
    id: RoomId,
    participants: Vec<Participant>,
}

impl Room {
    /// Create an empty room.
    #[must_use]
    pub fn new(id: impl Into<RoomId>) -> Self {
        Self {
            id: id.into(),
            participants: Vec::new(),
        }
    }

    /// Get the room identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Number of participants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// Check if the room has no participants.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Check if a connection is in this room.
    #[must_use]
    pub fn contains(&self, connection_id: &str) -> bool {
        self.position(connection_id).is_some()
    }

    /// Look up a participant by connection handle.
    #[must_use]
    pub fn get(&self, connection_id: &str) -> Option<&Participant> {
        self.position(connection_id).map(|i| &self.participants[i])
    }

    /// Add a participant.
    ///
    /// A connection that is already present keeps its position and takes the
    /// new display name. Returns `true` if the connection was not present.
    pub fn insert(&mut self, participant: Participant) -> bool {
        match self.position(&participant.connection_id) {
            Some(i) => {
                debug!(room = %self.id, connection = %participant.connection_id, "Participant re-registered");
                self.participants[i] = participant;
                false
            }
            None => {
                debug!(room = %self.id, connection = %participant.connection_id, "Participant added");
                self.participants.push(participant);
                true
            }
        }
    }

    /// Remove a participant, returning it if it was present.
    pub fn remove(&mut self, connection_id: &str) -> Option<Participant> {
        let i = self.position(connection_id)?;
        debug!(room = %self.id, connection = %connection_id, "Participant removed");
        Some(self.participants.remove(i))
    }

    /// All participants in join order.
    #[must_use]
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Every participant except `connection_id`.
    pub fn others<'a>(&'a self, connection_id: &'a str) -> impl Iterator<Item = &'a Participant> + 'a {
        self.participants
            .iter()
            .filter(move |p| p.connection_id != connection_id)
    }

    /// Owned copy of the roster.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Participant> {
        self.participants.clone()
    }

    fn position(&self, connection_id: &str) -> Option<usize> {
        self.participants
            .iter()
            .position(|p| p.connection_id == connection_id)
    }
}
