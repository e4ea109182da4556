//! # codesync-client
//!
//! Client side of a codesync room.
//!
//! - [`SessionController`] - join, roster tracking, snapshot exchange and
//!   notices, without any I/O
//! - [`DocumentBridge`] - couples a session to an [`EditorSurface`] and keeps
//!   remote applies from being sent back out
//! - [`SyncClient`] - drives a controller over a
//!   [`codesync_transport::Connection`]
//!
//! ```rust
//! use codesync_client::{SessionController, SessionState, TextBuffer};
//!
//! let mut session = SessionController::new("R1", "alice", TextBuffer::new());
//! session.begin_connect().unwrap();
//! session.channel_opened("conn_1").unwrap();
//!
//! assert_eq!(session.state(), SessionState::AwaitingRoster);
//! assert!(session.poll_transmit().is_some());
//! ```

pub mod bridge;
pub mod client;
pub mod session;

pub use bridge::{DocumentBridge, EditEvent, EditOrigin, EditorSurface, TextBuffer};
pub use client::{ClientCommand, ClientError, SyncClient};
pub use session::{
    generate_room_id, Clipboard, ClipboardError, Notice, SessionController, SessionError,
    SessionState, ToastLevel,
};
