//! Relay-side WebSocket connection on top of axum's upgrade.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use codesync_protocol::{Frame, FrameCodec};
use tracing::{debug, warn};

use crate::framing::FrameReader;
use crate::traits::{Connection, ConnectionId, TransportError};

/// A WebSocket accepted through `axum::extract::WebSocketUpgrade`.
pub struct AxumConnection {
    id: ConnectionId,
    socket: WebSocket,
    remote_addr: Option<String>,
    is_open: bool,
    reader: FrameReader,
}

impl AxumConnection {
    /// Wrap an upgraded socket under a freshly generated handle.
    #[must_use]
    pub fn new(socket: WebSocket, remote_addr: Option<String>, codec: FrameCodec) -> Self {
        Self {
            id: ConnectionId::generate(),
            socket,
            remote_addr,
            is_open: true,
            reader: FrameReader::new(codec),
        }
    }
}

#[async_trait]
impl Connection for AxumConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        if let Some(frame) = self.reader.next_frame()? {
            return Ok(Some(frame));
        }

        loop {
            match self.socket.recv().await {
                Some(Ok(Message::Binary(data))) => {
                    if let Some(frame) = self.reader.push(&data)? {
                        return Ok(Some(frame));
                    }
                }
                Some(Ok(Message::Text(text))) => {
                    if let Some(frame) = self.reader.push(text.as_bytes())? {
                        return Ok(Some(frame));
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = self.socket.send(Message::Pong(data)).await {
                        warn!(connection = %self.id, error = %e, "Failed to send pong");
                    }
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) => {
                    debug!(connection = %self.id, "Received close frame");
                    self.is_open = false;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    warn!(connection = %self.id, error = %e, "WebSocket error");
                    self.is_open = false;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!(connection = %self.id, "WebSocket stream ended");
                    self.is_open = false;
                    return Ok(None);
                }
            }
        }
    }

    async fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let data = self.reader.codec().encode(frame)?;
        self.send_raw(data).await
    }

    async fn send_raw(&mut self, data: Bytes) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }

        self.socket
            .send(Message::Binary(data.to_vec()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !std::mem::replace(&mut self.is_open, false) {
            return Ok(());
        }

        // The peer may already be gone; a failed close frame is not an error.
        if let Err(e) = self.socket.send(Message::Close(None)).await {
            debug!(connection = %self.id, error = %e, "Close frame not delivered");
        }
        Ok(())
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.clone()
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}
