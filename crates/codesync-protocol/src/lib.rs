//! # codesync-protocol
//!
//! Wire protocol for the codesync room relay.
//!
//! Clients join a room, receive the roster, and exchange whole-document
//! snapshots with the other participants through the relay.
//!
//! ## Frames
//!
//! - `join` / `joined` / `disconnected` - Room membership
//! - `code_change` / `sync_code` - Document snapshots
//! - `connected`, `ping` / `pong`, `error` - Connection plumbing
//!
//! ## Example
//!
//! ```rust
//! use codesync_protocol::{codec, Frame};
//!
//! let frame = Frame::join("R1", "alice");
//!
//! let encoded = codec::encode(&frame).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod frames;
pub mod version;

pub use codec::{decode, encode, FrameCodec, ProtocolError};
pub use frames::{error_codes, Frame, FrameType, Participant};
pub use version::{Version, PROTOCOL_VERSION};
