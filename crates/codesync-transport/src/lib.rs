//! # codesync-transport
//!
//! The message channel between a codesync client and the relay.
//!
//! - **WebSocket** (tokio-tungstenite) - client side, any async byte stream
//! - **axum** - relay side, wraps an upgraded `WebSocket`
//!
//! Both implement [`Connection`], so the relay loop and the client driver
//! are written once against the trait.
//!
//! ```rust,ignore
//! use codesync_transport::Connection;
//!
//! async fn drain(mut conn: impl Connection) {
//!     while let Ok(Some(frame)) = conn.recv().await {
//!         // Process frame
//!     }
//! }
//! ```

pub mod axum_ws;
mod framing;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use axum_ws::AxumConnection;
pub use traits::{Connection, ConnectionId, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnection;
