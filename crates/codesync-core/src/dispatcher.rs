//! Relay dispatcher.
//!
//! Routes inbound frames from one connection to registry operations and
//! fans the resulting events out to the other connections of the room.
//!
//! Each connection owns an unbounded outbox. Enqueueing never blocks, so a
//! slow peer cannot stall delivery to the rest of its room; the writer
//! draining an outbox is expected to bound each socket write with a timeout
//! and close the connection when it expires.

use crate::registry::{Departure, RoomRegistry};
use crate::room::{Room, RoomId};
use codesync_protocol::{error_codes, Frame, Participant};
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// A frame queued for delivery, shared between all recipients.
pub type Outbound = Arc<Frame>;

/// Receiving half of a connection's outbox.
pub type Outbox = mpsc::UnboundedReceiver<Outbound>;

/// Dispatch errors, reported back to the offending connection only.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The frame requires a joined room.
    #[error("Connection has not joined a room")]
    NotJoined,

    /// A second Join named a different room.
    #[error("Already joined room {joined}, cannot join {requested}")]
    RoomMismatch { joined: RoomId, requested: RoomId },

    /// The frame only travels from relay to client.
    #[error("Frame type {0} is not accepted from clients")]
    UnexpectedFrame(&'static str),

    /// The connection was already closed.
    #[error("Connection is closed")]
    Closed,
}

impl DispatchError {
    /// Protocol error code for this error.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            DispatchError::NotJoined | DispatchError::Closed => error_codes::NOT_JOINED,
            DispatchError::RoomMismatch { .. } => error_codes::ROOM_MISMATCH,
            DispatchError::UnexpectedFrame(_) => error_codes::UNEXPECTED_FRAME,
        }
    }

    /// The error frame sent back to the connection.
    #[must_use]
    pub fn to_frame(&self) -> Frame {
        Frame::error(self.code(), self.to_string())
    }
}

/// Lifecycle of one relay connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Channel open, no room yet.
    Connected,
    /// Registered in a room.
    Joined { room: RoomId },
    /// Channel closed; terminal.
    Closed,
}

/// Per-connection dispatcher state, owned by the connection's handler.
#[derive(Debug)]
pub struct Session {
    id: String,
    state: ConnectionState,
}

impl Session {
    /// The connection handle.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// The joined room, if any.
    #[must_use]
    pub fn room(&self) -> Option<&str> {
        match &self.state {
            ConnectionState::Joined { room } => Some(room),
            _ => None,
        }
    }

    fn joined_room(&self) -> Result<&str, DispatchError> {
        match &self.state {
            ConnectionState::Joined { room } => Ok(room),
            ConnectionState::Connected => Err(DispatchError::NotJoined),
            ConnectionState::Closed => Err(DispatchError::Closed),
        }
    }
}

/// The relay dispatcher.
#[derive(Debug, Default)]
pub struct Dispatcher {
    registry: Arc<RoomRegistry>,
    /// Outbox senders indexed by connection handle.
    peers: DashMap<String, mpsc::UnboundedSender<Outbound>>,
}

impl Dispatcher {
    /// Create a dispatcher with a fresh registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dispatcher over an existing registry.
    #[must_use]
    pub fn with_registry(registry: Arc<RoomRegistry>) -> Self {
        Self {
            registry,
            peers: DashMap::new(),
        }
    }

    /// The underlying room registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Number of open connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.peers.len()
    }

    /// Open a connection.
    ///
    /// Returns the session to pass to [`Dispatcher::dispatch`] and the outbox
    /// the connection's writer must drain.
    pub fn connect(&self, connection_id: impl Into<String>) -> (Session, Outbox) {
        let id = connection_id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        if self.peers.insert(id.clone(), tx).is_some() {
            warn!(connection = %id, "Connection handle reused, replacing outbox");
        }
        debug!(connection = %id, "Connection opened");

        let session = Session {
            id,
            state: ConnectionState::Connected,
        };
        (session, rx)
    }

    /// Handle one inbound frame.
    ///
    /// Returns a frame to send straight back to this connection, if any.
    ///
    /// # Errors
    ///
    /// Returns an error when the frame is not valid in the session's state.
    /// The session stays usable.
    pub fn dispatch(
        &self,
        session: &mut Session,
        frame: Frame,
    ) -> Result<Option<Frame>, DispatchError> {
        if session.state == ConnectionState::Closed {
            return Err(DispatchError::Closed);
        }

        match frame {
            Frame::Join { room, display_name } => {
                self.join(session, room, display_name)?;
                Ok(None)
            }
            Frame::CodeChange { room, code } => {
                self.code_change(session, room.as_deref(), code)?;
                Ok(None)
            }
            Frame::SyncCode { code, target } => {
                self.sync_code(session, code, &target)?;
                Ok(None)
            }
            Frame::Ping { timestamp } => Ok(Some(Frame::pong(timestamp))),
            Frame::Pong { .. } => Ok(None),
            other => Err(DispatchError::UnexpectedFrame(other.frame_type().as_str())),
        }
    }

    /// Close a connection.
    ///
    /// If it had joined a room, the remaining participants are told it left
    /// and the departure is returned. Calling this twice is harmless.
    pub fn disconnect(&self, session: &mut Session) -> Option<Departure> {
        let previous = std::mem::replace(&mut session.state, ConnectionState::Closed);
        self.peers.remove(&session.id);

        let departure = match previous {
            ConnectionState::Joined { .. } => {
                self.registry.unregister_with(&session.id, |departure, room| {
                    let frame = Arc::new(Frame::disconnected(
                        departure.connection_id.as_str(),
                        departure.display_name.as_str(),
                    ));
                    let delivered = self.fan_out(room.participants().iter(), &frame);
                    trace!(room = %departure.room, recipients = delivered, "Broadcast disconnected");
                })
            }
            ConnectionState::Connected | ConnectionState::Closed => None,
        };

        match &departure {
            Some(d) => info!(connection = %session.id, room = %d.room, "Left room"),
            None => debug!(connection = %session.id, "Connection closed"),
        }
        departure
    }

    fn join(
        &self,
        session: &mut Session,
        room: RoomId,
        display_name: String,
    ) -> Result<(), DispatchError> {
        if let ConnectionState::Joined { room: joined } = &session.state {
            if *joined != room {
                return Err(DispatchError::RoomMismatch {
                    joined: joined.clone(),
                    requested: room,
                });
            }
            debug!(connection = %session.id, room = %room, "Duplicate join, re-registering");
        }

        let participant = Participant::new(session.id.as_str(), display_name);
        let delivered = self
            .registry
            .register_with(&room, participant.clone(), |entry: &Room| {
                let frame = Arc::new(Frame::joined(entry.id(), entry.snapshot(), &participant));
                self.fan_out(entry.participants().iter(), &frame)
            });

        info!(
            connection = %session.id,
            room = %room,
            display_name = %participant.display_name,
            recipients = delivered,
            "Joined room"
        );
        session.state = ConnectionState::Joined { room };
        Ok(())
    }

    fn code_change(
        &self,
        session: &Session,
        claimed_room: Option<&str>,
        code: String,
    ) -> Result<(), DispatchError> {
        let room = session.joined_room()?;
        if let Some(claimed) = claimed_room.filter(|claimed| *claimed != room) {
            debug!(connection = %session.id, room = %room, claimed = %claimed, "Ignoring claimed room");
        }

        let frame = Arc::new(Frame::code_update(code));
        let delivered = self
            .registry
            .with_room(room, |entry| self.fan_out(entry.others(&session.id), &frame))
            .unwrap_or(0);

        trace!(connection = %session.id, room = %room, recipients = delivered, "Relayed code change");
        Ok(())
    }

    fn sync_code(&self, session: &Session, code: String, target: &str) -> Result<(), DispatchError> {
        let room = session.joined_room()?;

        // Targets that left, or never shared the room, are silently skipped.
        if self.registry.room_of(target).as_deref() != Some(room) {
            debug!(connection = %session.id, target = %target, "Sync target not in room, dropping");
            return Ok(());
        }

        let delivered = self.deliver(target, &Arc::new(Frame::code_update(code)));
        trace!(connection = %session.id, target = %target, delivered, "Forwarded sync");
        Ok(())
    }

    /// Enqueue a frame for every participant; returns how many outboxes took it.
    fn fan_out<'a>(&self, targets: impl Iterator<Item = &'a Participant>, frame: &Outbound) -> usize {
        targets
            .filter(|p| self.deliver(&p.connection_id, frame))
            .count()
    }

    fn deliver(&self, target: &str, frame: &Outbound) -> bool {
        match self.peers.get(target) {
            Some(tx) => tx.send(Arc::clone(frame)).is_ok(),
            None => false,
        }
    }
}
