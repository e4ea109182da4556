//! Frame types for the codesync protocol.
//!
//! Every event exchanged between a client and the relay is a [`Frame`].
//! Frames carry whole document snapshots, never deltas.

use serde::{Deserialize, Serialize};

/// Protocol error codes carried by [`Frame::Error`].
pub mod error_codes {
    /// The frame could not be decoded or is malformed.
    pub const INVALID_FRAME: u16 = 1001;
    /// The frame requires the connection to have joined a room first.
    pub const NOT_JOINED: u16 = 1002;
    /// A second Join named a different room than the one already joined.
    pub const ROOM_MISMATCH: u16 = 1003;
    /// A relay-to-client frame was sent by a client.
    pub const UNEXPECTED_FRAME: u16 = 1004;
}

/// Frame type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum FrameType {
    Connected = 0x01,
    Join = 0x02,
    Joined = 0x03,
    CodeChange = 0x04,
    SyncCode = 0x05,
    Disconnected = 0x06,
    Ping = 0x07,
    Pong = 0x08,
    Error = 0x09,
}

impl FrameType {
    /// Short lowercase label, used for log fields and metric labels.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FrameType::Connected => "connected",
            FrameType::Join => "join",
            FrameType::Joined => "joined",
            FrameType::CodeChange => "code_change",
            FrameType::SyncCode => "sync_code",
            FrameType::Disconnected => "disconnected",
            FrameType::Ping => "ping",
            FrameType::Pong => "pong",
            FrameType::Error => "error",
        }
    }
}

impl From<FrameType> for u8 {
    fn from(ft: FrameType) -> u8 {
        ft as u8
    }
}

impl TryFrom<u8> for FrameType {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, <Self as TryFrom<u8>>::Error> {
        match value {
            0x01 => Ok(FrameType::Connected),
            0x02 => Ok(FrameType::Join),
            0x03 => Ok(FrameType::Joined),
            0x04 => Ok(FrameType::CodeChange),
            0x05 => Ok(FrameType::SyncCode),
            0x06 => Ok(FrameType::Disconnected),
            0x07 => Ok(FrameType::Ping),
            0x08 => Ok(FrameType::Pong),
            0x09 => Ok(FrameType::Error),
            _ => Err("Invalid frame type"),
        }
    }
}

/// One member of a room roster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participant {
    /// Relay-assigned connection handle.
    pub connection_id: String,
    /// Free-form display name, not unique.
    pub display_name: String,
}

impl Participant {
    /// Create a participant.
    #[must_use]
    pub fn new(connection_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// A protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// First frame the relay sends on every connection.
    #[serde(rename = "connected")]
    Connected {
        /// The handle the relay assigned to this connection.
        connection_id: String,
        /// Major protocol version spoken by the relay.
        version: u8,
        /// Recommended heartbeat interval in milliseconds.
        heartbeat: u32,
    },

    /// Request to enter a room.
    #[serde(rename = "join")]
    Join {
        /// Room identifier, opaque.
        room: String,
        /// Display name, propagated verbatim.
        display_name: String,
    },

    /// Membership of a room changed; carries the full roster.
    #[serde(rename = "joined")]
    Joined {
        /// Room the roster belongs to.
        room: String,
        /// Every participant currently in the room.
        participants: Vec<Participant>,
        /// Display name of the participant that triggered this event.
        display_name: String,
        /// Connection handle of the participant that triggered this event.
        connection_id: String,
    },

    /// The document was replaced with `code`.
    #[serde(rename = "code_change")]
    CodeChange {
        /// Room, present on client-to-relay frames.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<String>,
        /// Full document text.
        code: String,
    },

    /// Ask the relay to deliver `code` to a single connection.
    #[serde(rename = "sync_code")]
    SyncCode {
        /// Full document text.
        code: String,
        /// Connection handle of the recipient.
        target: String,
    },

    /// A participant left the room.
    #[serde(rename = "disconnected")]
    Disconnected {
        /// Handle of the departed connection.
        connection_id: String,
        /// Display name of the departed participant.
        display_name: String,
    },

    /// Keepalive ping.
    #[serde(rename = "ping")]
    Ping {
        /// Optional timestamp.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Keepalive pong.
    #[serde(rename = "pong")]
    Pong {
        /// Echoed timestamp from ping.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Error response to the offending connection.
    #[serde(rename = "error")]
    Error {
        /// Error code, see [`error_codes`].
        code: u16,
        /// Human-readable error message.
        message: String,
    },
}

impl Frame {
    /// Get the frame type.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Connected { .. } => FrameType::Connected,
            Frame::Join { .. } => FrameType::Join,
            Frame::Joined { .. } => FrameType::Joined,
            Frame::CodeChange { .. } => FrameType::CodeChange,
            Frame::SyncCode { .. } => FrameType::SyncCode,
            Frame::Disconnected { .. } => FrameType::Disconnected,
            Frame::Ping { .. } => FrameType::Ping,
            Frame::Pong { .. } => FrameType::Pong,
            Frame::Error { .. } => FrameType::Error,
        }
    }

    /// Create a new Connected frame.
    #[must_use]
    pub fn connected(connection_id: impl Into<String>, version: u8, heartbeat: u32) -> Self {
        Frame::Connected {
            connection_id: connection_id.into(),
            version,
            heartbeat,
        }
    }

    /// Create a new Join frame.
    #[must_use]
    pub fn join(room: impl Into<String>, display_name: impl Into<String>) -> Self {
        Frame::Join {
            room: room.into(),
            display_name: display_name.into(),
        }
    }

    /// Create a new Joined frame announcing `joiner` to a room.
    #[must_use]
    pub fn joined(room: impl Into<String>, participants: Vec<Participant>, joiner: &Participant) -> Self {
        Frame::Joined {
            room: room.into(),
            participants,
            display_name: joiner.display_name.clone(),
            connection_id: joiner.connection_id.clone(),
        }
    }

    /// Create a client-to-relay CodeChange frame.
    #[must_use]
    pub fn code_change(room: impl Into<String>, code: impl Into<String>) -> Self {
        Frame::CodeChange {
            room: Some(room.into()),
            code: code.into(),
        }
    }

    /// Create a relay-to-client CodeChange frame.
    #[must_use]
    pub fn code_update(code: impl Into<String>) -> Self {
        Frame::CodeChange {
            room: None,
            code: code.into(),
        }
    }

    /// Create a new SyncCode frame.
    #[must_use]
    pub fn sync_code(code: impl Into<String>, target: impl Into<String>) -> Self {
        Frame::SyncCode {
            code: code.into(),
            target: target.into(),
        }
    }

    /// Create a new Disconnected frame.
    #[must_use]
    pub fn disconnected(connection_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Frame::Disconnected {
            connection_id: connection_id.into(),
            display_name: display_name.into(),
        }
    }

    /// Create a new Ping frame.
    #[must_use]
    pub fn ping() -> Self {
        Frame::Ping { timestamp: None }
    }

    /// Create a new Ping frame with timestamp.
    #[must_use]
    pub fn ping_with_timestamp(timestamp: u64) -> Self {
        Frame::Ping {
            timestamp: Some(timestamp),
        }
    }

    /// Create a new Pong frame.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        Frame::Pong { timestamp }
    }

    /// Create a new Error frame.
    #[must_use]
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Frame::Error {
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_type() {
        let join = Frame::join("R1", "alice");
        assert_eq!(join.frame_type(), FrameType::Join);

        let update = Frame::code_update("let x=1;");
        assert_eq!(update.frame_type(), FrameType::CodeChange);
        assert_eq!(update.frame_type().as_str(), "code_change");
    }

    #[test]
    fn test_frame_type_conversion() {
        assert_eq!(FrameType::try_from(0x02), Ok(FrameType::Join));
        assert_eq!(FrameType::try_from(0x05), Ok(FrameType::SyncCode));
        assert_eq!(u8::from(FrameType::Disconnected), 0x06);
        assert!(FrameType::try_from(0x00).is_err());
        assert!(FrameType::try_from(0x0A).is_err());
    }

    #[test]
    fn test_joined_names_the_joiner() {
        let alice = Participant::new("conn-a", "alice");
        let bob = Participant::new("conn-b", "bob");
        let frame = Frame::joined("R1", vec![alice, bob.clone()], &bob);

        match frame {
            Frame::Joined {
                room,
                participants,
                display_name,
                connection_id,
            } => {
                assert_eq!(room, "R1");
                assert_eq!(participants.len(), 2);
                assert_eq!(display_name, "bob");
                assert_eq!(connection_id, "conn-b");
            }
            other => panic!("Expected Joined, got {:?}", other),
        }
    }
}
