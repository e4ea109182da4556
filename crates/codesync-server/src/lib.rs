//! # codesync-server
//!
//! The codesync relay: accepts WebSocket connections, places them in rooms
//! and relays document snapshots between the participants of each room.

pub mod config;
pub mod handlers;
pub mod metrics;

pub use config::Config;
pub use handlers::{router, run_server, serve, serve_connection, AppState};
