//! End-to-end tests against a relay on an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use codesync_client::{ClientCommand, Notice, SessionController, SyncClient, TextBuffer};
use codesync_protocol::{error_codes, Frame, FrameCodec, Participant};
use codesync_server::{serve, AppState, Config};
use codesync_transport::{Connection, TransportError, WebSocketConnection};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

async fn start(config: Config) -> SocketAddr {
    start_with_state(config).await.0
}

async fn start_with_state(config: Config) -> (SocketAddr, Arc<AppState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(AppState::new(config));
    tokio::spawn(serve(listener, Arc::clone(&state)));
    (addr, state)
}

fn url(addr: SocketAddr) -> String {
    format!("ws://{addr}/ws")
}

async fn next(conn: &mut impl Connection) -> Option<Frame> {
    tokio::time::timeout(WAIT, conn.recv())
        .await
        .expect("timed out waiting for frame")
        .unwrap()
}

/// Connect and return the connection with the handle the relay assigned.
async fn open(addr: SocketAddr) -> (impl Connection, String) {
    let mut conn = WebSocketConnection::connect(&url(addr), FrameCodec::new())
        .await
        .unwrap();
    match next(&mut conn).await {
        Some(Frame::Connected {
            connection_id,
            version,
            ..
        }) => {
            assert_eq!(version, 1);
            (conn, connection_id)
        }
        other => panic!("expected connected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_two_clients_share_a_room() {
    let addr = start(Config::default()).await;

    let (mut alice, a) = open(addr).await;
    alice.send(&Frame::join("R1", "alice")).await.unwrap();
    let me = Participant::new(a.as_str(), "alice");
    assert_eq!(
        next(&mut alice).await,
        Some(Frame::joined("R1", vec![me.clone()], &me))
    );

    let (mut bob, b) = open(addr).await;
    bob.send(&Frame::join("R1", "bob")).await.unwrap();
    let bob_p = Participant::new(b.as_str(), "bob");
    let roster = Frame::joined("R1", vec![me.clone(), bob_p.clone()], &bob_p);
    assert_eq!(next(&mut alice).await, Some(roster.clone()));
    assert_eq!(next(&mut bob).await, Some(roster));

    alice
        .send(&Frame::sync_code("let x=1;", b.as_str()))
        .await
        .unwrap();
    assert_eq!(next(&mut bob).await, Some(Frame::code_update("let x=1;")));

    bob.send(&Frame::code_change("R1", "let x=2;")).await.unwrap();
    assert_eq!(next(&mut alice).await, Some(Frame::code_update("let x=2;")));

    bob.close().await.unwrap();
    assert_eq!(
        next(&mut alice).await,
        Some(Frame::disconnected(b.as_str(), "bob"))
    );
}

#[tokio::test]
async fn test_frames_before_join_are_rejected() {
    let addr = start(Config::default()).await;
    let (mut conn, _) = open(addr).await;

    conn.send(&Frame::code_change("R1", "x")).await.unwrap();
    match next(&mut conn).await {
        Some(Frame::Error { code, .. }) => assert_eq!(code, error_codes::NOT_JOINED),
        other => panic!("expected error, got {other:?}"),
    }

    // The connection stays usable.
    conn.send(&Frame::ping_with_timestamp(7)).await.unwrap();
    assert_eq!(next(&mut conn).await, Some(Frame::pong(Some(7))));
}

#[tokio::test]
async fn test_second_room_is_refused() {
    let addr = start(Config::default()).await;
    let (mut conn, _) = open(addr).await;

    conn.send(&Frame::join("R1", "alice")).await.unwrap();
    assert!(matches!(next(&mut conn).await, Some(Frame::Joined { .. })));

    conn.send(&Frame::join("R2", "alice")).await.unwrap();
    match next(&mut conn).await {
        Some(Frame::Error { code, .. }) => assert_eq!(code, error_codes::ROOM_MISMATCH),
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_connection_limit() {
    let mut config = Config::default();
    config.limits.max_connections = 1;
    let addr = start(config).await;

    let (_first, _) = open(addr).await;
    let refused = WebSocketConnection::connect(&url(addr), FrameCodec::new()).await;
    assert!(matches!(refused, Err(TransportError::ConnectFailed(_))));
}

#[tokio::test]
async fn test_silent_connection_is_closed() {
    let mut config = Config::default();
    config.heartbeat.timeout_ms = 100;
    let addr = start(config).await;

    let (mut conn, _) = open(addr).await;
    assert_eq!(next(&mut conn).await, None);
}

#[tokio::test]
async fn test_health_reports_counts() {
    let addr = start(Config::default()).await;
    let (mut conn, _) = open(addr).await;
    conn.send(&Frame::join("R1", "alice")).await.unwrap();
    next(&mut conn).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    let body = &response[response.find("\r\n\r\n").unwrap() + 4..];
    let json: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["connections"], 1);
    assert_eq!(json["rooms"], 1);
    assert_eq!(json["participants"], 1);
}

#[tokio::test]
async fn test_sync_client_serves_its_document() {
    let addr = start(Config::default()).await;

    let (notices_tx, mut notices) = mpsc::unbounded_channel();
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let controller = SessionController::new("R1", "alice", TextBuffer::with_text("fn main() {}"));
    let mut alice = SyncClient::new(controller, notices_tx);
    let target = url(addr);
    let task = tokio::spawn(async move {
        let result = alice
            .connect_and_run(&target, FrameCodec::new(), commands_rx)
            .await;
        (alice, result)
    });

    // Wait until alice holds the room before bob arrives.
    loop {
        match tokio::time::timeout(WAIT, notices.recv()).await.unwrap() {
            Some(Notice::RosterChanged(roster)) if roster.len() == 1 => break,
            Some(_) => {}
            None => panic!("alice stopped"),
        }
    }

    let (mut bob, _) = open(addr).await;
    bob.send(&Frame::join("R1", "bob")).await.unwrap();
    assert!(matches!(next(&mut bob).await, Some(Frame::Joined { .. })));
    assert_eq!(next(&mut bob).await, Some(Frame::code_update("fn main() {}")));

    commands_tx.send(ClientCommand::Leave).unwrap();
    match next(&mut bob).await {
        Some(Frame::Disconnected { display_name, .. }) => assert_eq!(display_name, "alice"),
        other => panic!("expected disconnected, got {other:?}"),
    }

    let (alice, result) = task.await.unwrap();
    assert!(result.is_ok());
    assert!(alice.controller().roster().is_empty());
}

#[tokio::test]
async fn test_oversized_frame_gets_error_before_close() {
    let mut config = Config::default();
    config.limits.max_message_size = 256;
    let addr = start(config).await;

    let (mut conn, _) = open(addr).await;
    conn.send(&Frame::join("R1", "alice")).await.unwrap();
    assert!(matches!(next(&mut conn).await, Some(Frame::Joined { .. })));

    conn.send(&Frame::code_change("R1", "x".repeat(500)))
        .await
        .unwrap();
    match next(&mut conn).await {
        Some(Frame::Error { code, .. }) => assert_eq!(code, error_codes::INVALID_FRAME),
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(next(&mut conn).await, None);
}

#[tokio::test]
async fn test_relay_frames_may_exceed_inbound_cap() {
    let mut config = Config::default();
    config.limits.max_message_size = 64;
    let addr = start(config).await;

    let (mut alice, a) = open(addr).await;
    alice.send(&Frame::join("R1", "alice")).await.unwrap();
    next(&mut alice).await;

    let (mut bob, b) = open(addr).await;
    bob.send(&Frame::join("R1", "bob")).await.unwrap();

    // The two-member roster is larger than 64 bytes.
    let expected = vec![Participant::new(a, "alice"), Participant::new(b, "bob")];
    for conn in [&mut alice, &mut bob] {
        match next(conn).await {
            Some(Frame::Joined { participants, .. }) => assert_eq!(participants, expected),
            other => panic!("expected joined, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_stalled_peer_does_not_hold_up_room() {
    const FRAMES: usize = 40;

    let mut config = Config::default();
    config.relay.send_timeout_ms = 200;
    let addr = start(config).await;

    let (mut alice, _) = open(addr).await;
    alice.send(&Frame::join("R1", "alice")).await.unwrap();
    next(&mut alice).await;

    let (mut bob, _) = open(addr).await;
    bob.send(&Frame::join("R1", "bob")).await.unwrap();
    next(&mut alice).await;
    next(&mut bob).await;

    // Carol joins and then never reads again.
    let (mut carol, c) = open(addr).await;
    carol.send(&Frame::join("R1", "carol")).await.unwrap();
    next(&mut alice).await;
    next(&mut bob).await;

    let writer = tokio::spawn(async move {
        let code = "x".repeat(512 * 1024);
        for _ in 0..FRAMES {
            alice
                .send(&Frame::code_change("R1", code.as_str()))
                .await
                .unwrap();
        }
        alice
    });

    let mut updates = 0;
    let mut carol_left = false;
    while updates < FRAMES || !carol_left {
        match next(&mut bob).await {
            Some(Frame::CodeChange { code, .. }) => {
                assert_eq!(code.len(), 512 * 1024);
                updates += 1;
            }
            Some(Frame::Disconnected { connection_id, .. }) => {
                assert_eq!(connection_id, c);
                carol_left = true;
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    let _alice = writer.await.unwrap();
    drop(carol);
}

#[tokio::test]
async fn test_empty_rooms_are_swept() {
    let mut config = Config::default();
    config.relay.sweep_interval_ms = 20;
    let (addr, state) = start_with_state(config).await;

    let (mut conn, _) = open(addr).await;
    conn.send(&Frame::join("R1", "alice")).await.unwrap();
    next(&mut conn).await;
    assert!(state.dispatcher.registry().room_exists("R1"));

    conn.close().await.unwrap();
    let registry = state.dispatcher.registry();
    for _ in 0..250 {
        if registry.stats().room_count == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(registry.stats().room_count, 0);
    assert!(!registry.room_exists("R1"));
}

#[tokio::test]
async fn test_connection_slot_is_released() {
    let mut config = Config::default();
    config.limits.max_connections = 1;
    let addr = start(config).await;

    let (mut first, _) = open(addr).await;
    first.close().await.unwrap();

    let mut reconnected = None;
    for _ in 0..100 {
        match WebSocketConnection::connect(&url(addr), FrameCodec::new()).await {
            Ok(conn) => {
                reconnected = Some(conn);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    let mut conn = reconnected.expect("slot was never released");
    assert!(matches!(next(&mut conn).await, Some(Frame::Connected { .. })));
}
