//! Session controller.
//!
//! Client-side state machine for one room visit:
//!
//! ```text
//! Idle ──▶ Connecting ──▶ AwaitingRoster ──▶ Active ──▶ Left
//!              │                 │              ▲
//!              └─────────────────┴── failure ───┘ (to Left)
//! ```
//!
//! The controller performs no I/O. Callers feed it channel events and
//! editor changes, then drain [`SessionController::poll_transmit`] into the
//! channel and [`SessionController::poll_notice`] into the UI.

use std::collections::VecDeque;
use std::fmt;

use codesync_protocol::{Frame, Participant, Version};
use thiserror::Error;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::bridge::{DocumentBridge, EditorSurface};

/// Create a fresh, unguessable room identifier.
#[must_use]
pub fn generate_room_id() -> String {
    Uuid::new_v4().to_string()
}

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing started yet.
    Idle,
    /// Waiting for the message channel to open.
    Connecting,
    /// Join sent, waiting for the Joined event naming this connection.
    AwaitingRoster,
    /// In the room.
    Active,
    /// Left or failed; terminal.
    Left,
}

/// Severity of a toast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Success,
    Error,
}

/// Something the UI should show or do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Transient user-visible message.
    Toast { level: ToastLevel, message: String },
    /// The locally known roster changed.
    RosterChanged(Vec<Participant>),
    /// The session is over; leave the editor view.
    NavigateAway,
}

impl Notice {
    fn success(message: impl Into<String>) -> Self {
        Notice::Toast {
            level: ToastLevel::Success,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Notice::Toast {
            level: ToastLevel::Error,
            message: message.into(),
        }
    }
}

/// Session errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// An operation was attempted in a state that does not allow it.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// The message channel failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The relay speaks a different major protocol version.
    #[error("Relay speaks protocol {relay}, client speaks {client}")]
    IncompatibleVersion { relay: Version, client: Version },
}

/// Clipboard failure.
#[derive(Debug, Error)]
#[error("Clipboard unavailable: {0}")]
pub struct ClipboardError(pub String);

/// The external clipboard capability.
pub trait Clipboard {
    /// Put `text` on the clipboard.
    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError>;
}

/// Drives one client through a room visit.
#[derive(Debug)]
pub struct SessionController<E> {
    room: String,
    display_name: String,
    state: SessionState,
    connection_id: Option<String>,
    roster: Vec<Participant>,
    bridge: DocumentBridge<E>,
    transmit: VecDeque<Frame>,
    notices: VecDeque<Notice>,
}

impl<E: EditorSurface> SessionController<E> {
    /// Create an idle controller for `room` editing through `surface`.
    #[must_use]
    pub fn new(room: impl Into<String>, display_name: impl Into<String>, surface: E) -> Self {
        Self {
            room: room.into(),
            display_name: display_name.into(),
            state: SessionState::Idle,
            connection_id: None,
            roster: Vec::new(),
            bridge: DocumentBridge::new(surface),
            transmit: VecDeque::new(),
            notices: VecDeque::new(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The room this session is for.
    #[must_use]
    pub fn room(&self) -> &str {
        &self.room
    }

    /// The local display name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// The relay's handle for this client, once the channel is open.
    #[must_use]
    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    /// The locally known roster.
    #[must_use]
    pub fn roster(&self) -> &[Participant] {
        &self.roster
    }

    /// The local view of the document.
    #[must_use]
    pub fn document(&self) -> String {
        self.bridge.text()
    }

    /// The document bridge.
    #[must_use]
    pub fn bridge(&self) -> &DocumentBridge<E> {
        &self.bridge
    }

    /// Mutable access to the document bridge.
    pub fn bridge_mut(&mut self) -> &mut DocumentBridge<E> {
        &mut self.bridge
    }

    /// The user asked to enter the room; the caller now opens the channel.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ProtocolViolation`] unless the session is idle.
    pub fn begin_connect(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::ProtocolViolation("session already started"));
        }
        debug!(room = %self.room, "Connecting");
        self.state = SessionState::Connecting;
        Ok(())
    }

    /// The channel is open and the relay assigned `connection_id`; queues Join.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ProtocolViolation`] if the session is not
    /// connecting, since Join may only travel over a freshly opened channel.
    pub fn channel_opened(&mut self, connection_id: impl Into<String>) -> Result<(), SessionError> {
        if self.state != SessionState::Connecting {
            return Err(SessionError::ProtocolViolation(
                "join attempted on a channel that is not open",
            ));
        }

        let connection_id = connection_id.into();
        debug!(room = %self.room, connection = %connection_id, "Channel open, joining");
        self.connection_id = Some(connection_id);
        self.transmit
            .push_back(Frame::join(self.room.as_str(), self.display_name.as_str()));
        self.state = SessionState::AwaitingRoster;
        Ok(())
    }

    /// React to a frame delivered by the channel.
    pub fn handle_frame(&mut self, frame: Frame) {
        if !matches!(
            self.state,
            SessionState::AwaitingRoster | SessionState::Active
        ) {
            trace!(state = ?self.state, frame_type = ?frame.frame_type(), "No handlers, dropping frame");
            return;
        }

        match frame {
            Frame::Joined {
                room,
                participants,
                display_name,
                connection_id,
            } => self.on_joined(room, participants, display_name, connection_id),
            Frame::Disconnected {
                connection_id,
                display_name,
            } => self.on_disconnected(&connection_id, &display_name),
            Frame::CodeChange { code, .. } => {
                if self.bridge.apply_remote(&code) {
                    trace!(room = %self.room, len = code.len(), "Applied remote snapshot");
                }
                self.pump_editor();
            }
            Frame::Error { code, message } => {
                warn!(room = %self.room, code, message = %message, "Relay reported an error");
            }
            Frame::Pong { .. } => {}
            other => {
                debug!(frame_type = ?other.frame_type(), "Unexpected frame from relay");
            }
        }
    }

    /// Forward user edits reported by the editing surface.
    ///
    /// Changes tagged as remote applies are dropped here, so a snapshot
    /// received from a peer is never sent back out.
    pub fn pump_editor(&mut self) {
        let edits = self.bridge.local_edits();
        if !matches!(
            self.state,
            SessionState::AwaitingRoster | SessionState::Active
        ) {
            return;
        }
        for code in edits {
            self.transmit
                .push_back(Frame::code_change(self.room.as_str(), code));
        }
    }

    /// The user replaced the document with `text`.
    pub fn edit(&mut self, text: &str) {
        self.bridge.edit(text);
        self.pump_editor();
    }

    /// The user left the room. The caller closes the channel.
    pub fn leave(&mut self) {
        if self.state == SessionState::Left {
            return;
        }
        info!(room = %self.room, "Leaving room");
        self.state = SessionState::Left;
        self.roster.clear();
    }

    /// The channel could not be established or failed mid-session.
    ///
    /// The session is abandoned: pending frames are discarded, an error is
    /// shown and the UI is told to navigate away.
    pub fn channel_failed(&mut self, error: impl fmt::Display) {
        warn!(room = %self.room, error = %error, "Connection failed");
        self.state = SessionState::Left;
        self.roster.clear();
        self.transmit.clear();
        self.notices
            .push_back(Notice::error("Socket connection failed, try again later."));
        self.notices.push_back(Notice::NavigateAway);
    }

    /// Copy the room identifier so it can be shared. Failure is not fatal.
    pub fn copy_room_id(&mut self, clipboard: &mut impl Clipboard) {
        match clipboard.write_text(&self.room) {
            Ok(()) => self
                .notices
                .push_back(Notice::success("Room ID copied successfully")),
            Err(e) => {
                warn!(error = %e, "Copying room id failed");
                self.notices.push_back(Notice::error("Something wrong happened"));
            }
        }
    }

    /// Next frame to send over the channel.
    pub fn poll_transmit(&mut self) -> Option<Frame> {
        self.transmit.pop_front()
    }

    /// Next notice for the UI.
    pub fn poll_notice(&mut self) -> Option<Notice> {
        self.notices.pop_front()
    }

    fn on_joined(
        &mut self,
        room: String,
        participants: Vec<Participant>,
        display_name: String,
        connection_id: String,
    ) {
        if room != self.room {
            warn!(expected = %self.room, got = %room, "Roster for another room, ignoring");
            return;
        }

        self.roster = participants;
        self.notices
            .push_back(Notice::RosterChanged(self.roster.clone()));

        if self.connection_id.as_deref() == Some(connection_id.as_str()) {
            if self.state == SessionState::AwaitingRoster {
                info!(room = %self.room, participants = self.roster.len(), "Joined room");
                self.state = SessionState::Active;
            }
            return;
        }

        self.notices
            .push_back(Notice::success(format!("{display_name} has joined the room.")));

        // A fresh joiner holds nothing worth sending.
        if self.bridge.has_document() {
            debug!(room = %self.room, target = %connection_id, "Syncing document to new peer");
            self.transmit
                .push_back(Frame::sync_code(self.bridge.text(), connection_id));
        }
    }

    fn on_disconnected(&mut self, connection_id: &str, display_name: &str) {
        self.roster.retain(|p| p.connection_id != connection_id);
        self.notices
            .push_back(Notice::RosterChanged(self.roster.clone()));
        self.notices
            .push_back(Notice::success(format!("{display_name} left the room.")));
    }
}
