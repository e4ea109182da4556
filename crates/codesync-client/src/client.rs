//! Async driver that runs a [`SessionController`] over a [`Connection`].

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use codesync_protocol::{Frame, FrameCodec, Version, PROTOCOL_VERSION};
use codesync_transport::{Connection, TransportError, WebSocketConnection};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::bridge::EditorSurface;
use crate::session::{Notice, SessionController, SessionError, SessionState};

/// How long the relay has to greet a new connection.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Used when the relay advertises no heartbeat interval.
const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(30);

/// Input from the UI while a session runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// The user replaced the document.
    Edit(String),
    /// The user left the room.
    Leave,
}

/// Client driver errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Runs one room visit over a live channel.
pub struct SyncClient<E> {
    controller: SessionController<E>,
    notices: mpsc::UnboundedSender<Notice>,
}

impl<E: EditorSurface + Send> SyncClient<E> {
    /// Wrap a controller. Notices are forwarded to `notices` as they appear.
    pub fn new(controller: SessionController<E>, notices: mpsc::UnboundedSender<Notice>) -> Self {
        Self {
            controller,
            notices,
        }
    }

    /// The wrapped controller.
    pub fn controller(&self) -> &SessionController<E> {
        &self.controller
    }

    /// Give back the controller once the session is over.
    pub fn into_controller(self) -> SessionController<E> {
        self.controller
    }

    /// Open a WebSocket to `url` and run the session until it ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay cannot be reached or the session fails.
    /// In both cases the controller has already moved to
    /// [`SessionState::Left`] and reported the failure as notices.
    pub async fn connect_and_run(
        &mut self,
        url: &str,
        codec: FrameCodec,
        commands: mpsc::UnboundedReceiver<ClientCommand>,
    ) -> Result<(), ClientError> {
        self.controller.begin_connect()?;

        let conn = match WebSocketConnection::connect(url, codec).await {
            Ok(conn) => conn,
            Err(e) => {
                self.controller.channel_failed(&e);
                self.flush_notices();
                return Err(e.into());
            }
        };

        self.run(conn, commands).await
    }

    /// Run the session over an already established connection.
    ///
    /// Returns `Ok(())` once the user leaves.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake fails, the relay speaks an
    /// incompatible protocol, or the channel breaks mid-session.
    pub async fn run<C: Connection>(
        &mut self,
        mut conn: C,
        mut commands: mpsc::UnboundedReceiver<ClientCommand>,
    ) -> Result<(), ClientError> {
        if self.controller.state() == SessionState::Idle {
            self.controller.begin_connect()?;
        }

        let result = self.drive(&mut conn, &mut commands).await;
        if let Err(e) = &result {
            self.controller.channel_failed(e);
        }
        self.flush_notices();

        if let Err(e) = conn.close().await {
            debug!(error = %e, "Close failed");
        }
        result
    }

    async fn drive<C: Connection>(
        &mut self,
        conn: &mut C,
        commands: &mut mpsc::UnboundedReceiver<ClientCommand>,
    ) -> Result<(), ClientError> {
        let heartbeat = self.handshake(conn).await?;

        let mut ping = tokio::time::interval(heartbeat);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        ping.tick().await;

        loop {
            self.flush(conn).await?;
            if self.controller.state() == SessionState::Left {
                return Ok(());
            }

            tokio::select! {
                frame = conn.recv() => match frame? {
                    Some(frame) => self.controller.handle_frame(frame),
                    None => {
                        return Err(SessionError::Connection(
                            "relay closed the connection".to_string(),
                        )
                        .into());
                    }
                },
                command = commands.recv() => match command {
                    Some(ClientCommand::Edit(text)) => self.controller.edit(&text),
                    Some(ClientCommand::Leave) | None => self.controller.leave(),
                },
                _ = ping.tick() => {
                    conn.send(&Frame::ping_with_timestamp(now_millis())).await?;
                }
            }
        }
    }

    /// Wait for the relay's greeting and join the room.
    async fn handshake<C: Connection>(&mut self, conn: &mut C) -> Result<Duration, ClientError> {
        let greeting = tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.recv())
            .await
            .map_err(|_| SessionError::Connection("handshake timed out".to_string()))??;

        let Some(Frame::Connected {
            connection_id,
            version,
            heartbeat,
        }) = greeting
        else {
            return Err(SessionError::ProtocolViolation("expected connected frame").into());
        };

        let relay = Version::from_major(version);
        if !PROTOCOL_VERSION.is_compatible_with(&relay) {
            return Err(SessionError::IncompatibleVersion {
                relay,
                client: PROTOCOL_VERSION,
            }
            .into());
        }

        info!(connection = %connection_id, room = %self.controller.room(), "Connected to relay");
        self.controller.channel_opened(connection_id)?;

        Ok(if heartbeat == 0 {
            DEFAULT_HEARTBEAT
        } else {
            Duration::from_millis(u64::from(heartbeat))
        })
    }

    async fn flush<C: Connection>(&mut self, conn: &mut C) -> Result<(), ClientError> {
        while let Some(frame) = self.controller.poll_transmit() {
            conn.send(&frame).await?;
        }
        self.flush_notices();
        Ok(())
    }

    fn flush_notices(&mut self) {
        while let Some(notice) = self.controller.poll_notice() {
            if self.notices.send(notice).is_err() {
                warn!("Notice receiver dropped");
                break;
            }
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
