//! Connection handlers for the relay.
//!
//! This module handles the connection lifecycle: upgrade, the per-connection
//! read/write loop, and the background sweep of empty rooms.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::{Context, Result};
use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use codesync_core::{DispatchError, Dispatcher};
use codesync_protocol::{
    codec::{LENGTH_PREFIX_SIZE, MAX_FRAME_SIZE},
    error_codes, Frame, FrameCodec, PROTOCOL_VERSION,
};
use codesync_transport::{AxumConnection, Connection, TransportError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

/// Shared server state.
pub struct AppState {
    /// Routes frames between connections.
    pub dispatcher: Dispatcher,
    /// Server configuration.
    pub config: Config,
    /// Connection slots; a permit is held for the life of each socket.
    slots: Arc<Semaphore>,
    /// Applies the configured size cap to client frames.
    inbound: FrameCodec,
    /// Relay-built frames grow with the roster, so only the protocol cap applies.
    outbound: FrameCodec,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let slots = config.limits.max_connections.min(Semaphore::MAX_PERMITS);
        Self {
            dispatcher: Dispatcher::new(),
            slots: Arc::new(Semaphore::new(slots)),
            inbound: FrameCodec::with_max_frame_size(config.limits.max_message_size),
            outbound: FrameCodec::new(),
            config,
        }
    }
}

/// Why a connection loop ended early.
#[derive(Debug, Error)]
enum WriteError {
    #[error("write timed out after {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Build the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("codesync relay listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    serve(listener, Arc::new(AppState::new(config))).await
}

/// Serve on an already bound listener until the server stops.
///
/// # Errors
///
/// Returns an error if accepting connections fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    let sweeper = spawn_sweeper(Arc::clone(&state));
    let app = router(state);

    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await;

    sweeper.abort();
    result.context("Server error")
}

/// Periodically drop rooms that have emptied out.
fn spawn_sweeper(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(state.config.sweep_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let registry = state.dispatcher.registry();
            let swept = registry.sweep_empty_rooms();
            if swept > 0 {
                debug!(swept, "Swept empty rooms");
            }
            metrics::set_active_rooms(registry.stats().occupied_rooms);
        }
    })
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.dispatcher.registry().stats();
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.dispatcher.connection_count(),
        "rooms": stats.occupied_rooms,
        "participants": stats.participant_count,
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Ok(slot) = Arc::clone(&state.slots).try_acquire_owned() else {
        warn!(remote = %remote, "Connection limit reached, refusing");
        metrics::record_refused();
        return (StatusCode::SERVICE_UNAVAILABLE, "Connection limit reached").into_response();
    };

    // The socket only stops messages no frame could fit in; the configured
    // limit is enforced by the frame reader so the client gets an error frame.
    let socket_cap = state.config.limits.max_message_size.max(MAX_FRAME_SIZE) + LENGTH_PREFIX_SIZE;
    ws.max_message_size(socket_cap)
        .on_upgrade(move |socket| async move {
            let _slot = slot;
            let _metrics_guard = ConnectionMetricsGuard::new();
            let conn = AxumConnection::new(socket, Some(remote.to_string()), state.inbound);
            serve_connection(conn, &state).await;
        })
}

/// Drive one connection until it closes.
///
/// Inbound frames go through the dispatcher; frames queued in the
/// connection's outbox by other connections are written out, each write
/// bounded by the configured send timeout. A connection that stays silent
/// longer than the heartbeat timeout is closed. However the loop ends, the
/// connection is disconnected from the dispatcher so its room is told.
pub async fn serve_connection<C: Connection>(mut conn: C, state: &AppState) {
    let id = conn.id().to_string();
    let (mut session, mut outbox) = state.dispatcher.connect(id.as_str());
    let send_timeout = state.config.send_timeout();
    let idle = state.config.heartbeat_timeout();

    debug!(connection = %id, remote = ?conn.remote_addr(), "WebSocket connected");

    let connected = Frame::connected(
        id.as_str(),
        PROTOCOL_VERSION.major,
        u32::try_from(state.config.heartbeat.interval_ms).unwrap_or(u32::MAX),
    );

    if let Err(e) = write(&mut conn, &state.outbound, &connected, send_timeout).await {
        warn!(connection = %id, error = %e, "Failed to send connected frame");
    } else {
        let deadline = tokio::time::sleep(idle);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                Some(frame) = outbox.recv() => {
                    if let Err(e) = write(&mut conn, &state.outbound, &frame, send_timeout).await {
                        if matches!(e, WriteError::TimedOut(_)) {
                            metrics::record_slow_peer_drop();
                        }
                        warn!(connection = %id, error = %e, "Dropping peer");
                        break;
                    }
                }

                received = conn.recv() => match received {
                    Ok(Some(frame)) => {
                        deadline.as_mut().reset(tokio::time::Instant::now() + idle);

                        let start = Instant::now();
                        let frame_type = frame.frame_type().as_str();
                        metrics::record_inbound(frame_type);
                        let is_join = matches!(frame, Frame::Join { .. });

                        let reply = match state.dispatcher.dispatch(&mut session, frame) {
                            Ok(reply) => {
                                if is_join {
                                    metrics::record_join();
                                    metrics::set_active_rooms(
                                        state.dispatcher.registry().stats().occupied_rooms,
                                    );
                                }
                                reply
                            }
                            Err(e) => {
                                debug!(connection = %id, error = %e, frame_type, "Rejected frame");
                                metrics::record_error(dispatch_error_label(&e));
                                Some(e.to_frame())
                            }
                        };
                        metrics::record_latency(start.elapsed().as_secs_f64());

                        if let Some(reply) = reply {
                            if let Err(e) = write(&mut conn, &state.outbound, &reply, send_timeout).await {
                                warn!(connection = %id, error = %e, "Failed to reply");
                                break;
                            }
                        }
                    }
                    Ok(None) => {
                        debug!(connection = %id, "Connection closed by peer");
                        break;
                    }
                    Err(e @ (TransportError::Protocol(_) | TransportError::MessageTooLarge { .. })) => {
                        warn!(connection = %id, error = %e, "Invalid frame, closing");
                        metrics::record_error("invalid_frame");
                        let reply = Frame::error(error_codes::INVALID_FRAME, e.to_string());
                        if let Err(e) = write(&mut conn, &state.outbound, &reply, send_timeout).await {
                            trace!(connection = %id, error = %e, "Error frame not delivered");
                        }
                        break;
                    }
                    Err(e) => {
                        warn!(connection = %id, error = %e, "Receive failed");
                        metrics::record_error("transport");
                        break;
                    }
                },

                () = &mut deadline => {
                    info!(connection = %id, "Heartbeat timeout, closing");
                    metrics::record_error("heartbeat_timeout");
                    break;
                }
            }
        }
    }

    if state.dispatcher.disconnect(&mut session).is_some() {
        metrics::set_active_rooms(state.dispatcher.registry().stats().occupied_rooms);
    }
    match tokio::time::timeout(send_timeout, conn.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => trace!(connection = %id, error = %e, "Close failed"),
        Err(_) => trace!(connection = %id, "Close timed out"),
    }

    debug!(connection = %id, "WebSocket disconnected");
}

/// Encode and write one frame, giving up after `limit`.
async fn write<C: Connection>(
    conn: &mut C,
    codec: &FrameCodec,
    frame: &Frame,
    limit: Duration,
) -> Result<(), WriteError> {
    let data = codec.encode(frame).map_err(TransportError::from)?;
    let len = data.len();

    tokio::time::timeout(limit, conn.send_raw(data))
        .await
        .map_err(|_| WriteError::TimedOut(limit))??;

    metrics::record_outbound(frame.frame_type().as_str(), len);
    Ok(())
}

fn dispatch_error_label(error: &DispatchError) -> &'static str {
    match error {
        DispatchError::NotJoined => "not_joined",
        DispatchError::RoomMismatch { .. } => "room_mismatch",
        DispatchError::UnexpectedFrame(_) => "unexpected_frame",
        DispatchError::Closed => "closed",
    }
}
