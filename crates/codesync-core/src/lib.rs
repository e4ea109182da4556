//! # codesync-core
//!
//! Room membership and relay routing for the codesync relay.
//!
//! - **Room** - Participants of one shared document, in join order
//! - **RoomRegistry** - Room membership shared by every connection
//! - **Dispatcher** - Per-connection state machine and room fan-out
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐
//! │  Connection │────▶│ Dispatcher  │────▶│ RoomRegistry │
//! └─────────────┘     └─────────────┘     └──────────────┘
//!        ▲                   │
//!        └──── outbox ◀──────┘
//! ```

pub mod dispatcher;
pub mod registry;
pub mod room;

pub use dispatcher::{ConnectionState, DispatchError, Dispatcher, Outbound, Outbox, Session};
pub use registry::{Departure, RegistryStats, RoomRegistry};
pub use room::{Room, RoomId};
