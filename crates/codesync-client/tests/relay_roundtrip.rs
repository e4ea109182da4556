//! Controllers wired to an in-process dispatcher.

use codesync_client::{Notice, SessionController, SessionState, TextBuffer, ToastLevel};
use codesync_core::{Dispatcher, Outbox, Session};
use codesync_protocol::Participant;

struct Peer {
    controller: SessionController<TextBuffer>,
    session: Session,
    outbox: Outbox,
}

impl Peer {
    fn join(dispatcher: &Dispatcher, room: &str, id: &str, name: &str, text: &str) -> Self {
        let mut controller = SessionController::new(room, name, TextBuffer::with_text(text));
        controller.begin_connect().unwrap();
        let (session, outbox) = dispatcher.connect(id);
        controller.channel_opened(id).unwrap();
        Self {
            controller,
            session,
            outbox,
        }
    }

    fn notices(&mut self) -> Vec<Notice> {
        std::iter::from_fn(|| self.controller.poll_notice()).collect()
    }

    fn names(&self) -> Vec<&str> {
        self.controller
            .roster()
            .iter()
            .map(|p| p.display_name.as_str())
            .collect()
    }
}

/// Move frames between controllers and the dispatcher until nothing is in flight.
fn settle(dispatcher: &Dispatcher, peers: &mut [&mut Peer]) -> usize {
    let mut moved = 0;
    loop {
        let before = moved;
        for peer in peers.iter_mut() {
            while let Some(frame) = peer.controller.poll_transmit() {
                moved += 1;
                if let Ok(Some(reply)) = dispatcher.dispatch(&mut peer.session, frame) {
                    peer.controller.handle_frame(reply);
                }
            }
        }
        for peer in peers.iter_mut() {
            while let Ok(frame) = peer.outbox.try_recv() {
                moved += 1;
                peer.controller.handle_frame((*frame).clone());
            }
        }
        if moved == before {
            return moved;
        }
    }
}

fn toasts(notices: &[Notice]) -> Vec<&str> {
    notices
        .iter()
        .filter_map(|n| match n {
            Notice::Toast {
                level: ToastLevel::Success,
                message,
            } => Some(message.as_str()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_two_peers_edit_and_leave() {
    let dispatcher = Dispatcher::new();

    let mut alice = Peer::join(&dispatcher, "R1", "A", "alice", "");
    settle(&dispatcher, &mut [&mut alice]);
    assert_eq!(alice.controller.state(), SessionState::Active);
    assert_eq!(alice.names(), vec!["alice"]);

    alice.controller.edit("let x=1;");
    settle(&dispatcher, &mut [&mut alice]);
    alice.notices();

    let mut bob = Peer::join(&dispatcher, "R1", "B", "bob", "");
    settle(&dispatcher, &mut [&mut alice, &mut bob]);

    // Bob gets the roster and alice's document through the sync reply.
    assert_eq!(bob.controller.state(), SessionState::Active);
    assert_eq!(bob.names(), vec!["alice", "bob"]);
    assert_eq!(alice.names(), vec!["alice", "bob"]);
    assert_eq!(bob.controller.document(), "let x=1;");
    assert_eq!(toasts(&alice.notices()), vec!["bob has joined the room."]);
    assert!(toasts(&bob.notices()).is_empty());

    bob.controller.edit("let x=2;");
    settle(&dispatcher, &mut [&mut alice, &mut bob]);
    assert_eq!(alice.controller.document(), "let x=2;");
    assert_eq!(bob.controller.document(), "let x=2;");

    bob.controller.leave();
    dispatcher.disconnect(&mut bob.session);
    settle(&dispatcher, &mut [&mut alice]);

    assert_eq!(alice.names(), vec!["alice"]);
    assert_eq!(toasts(&alice.notices()), vec!["bob left the room."]);
    assert_eq!(
        dispatcher.registry().list_participants("R1"),
        vec![Participant::new("A", "alice")]
    );
}

#[test]
fn test_remote_snapshots_are_not_echoed() {
    let dispatcher = Dispatcher::new();
    let mut alice = Peer::join(&dispatcher, "R1", "A", "alice", "");
    let mut bob = Peer::join(&dispatcher, "R1", "B", "bob", "");
    settle(&dispatcher, &mut [&mut alice, &mut bob]);

    alice.controller.edit("a");
    // One CodeChange out, one update in. Nothing bounces back.
    assert_eq!(settle(&dispatcher, &mut [&mut alice, &mut bob]), 2);
    assert_eq!(bob.controller.document(), "a");

    bob.controller.pump_editor();
    assert!(bob.controller.poll_transmit().is_none());
}

#[test]
fn test_rosters_converge_for_three_peers() {
    let dispatcher = Dispatcher::new();
    let mut alice = Peer::join(&dispatcher, "R1", "A", "alice", "");
    settle(&dispatcher, &mut [&mut alice]);
    let mut bob = Peer::join(&dispatcher, "R1", "B", "bob", "");
    settle(&dispatcher, &mut [&mut alice, &mut bob]);
    let mut carol = Peer::join(&dispatcher, "R1", "C", "carol", "");
    settle(&dispatcher, &mut [&mut alice, &mut bob, &mut carol]);

    let expected = dispatcher.registry().list_participants("R1");
    for peer in [&alice, &bob, &carol] {
        assert_eq!(peer.controller.roster(), expected.as_slice());
    }
    assert_eq!(carol.names(), vec!["alice", "bob", "carol"]);
}

#[test]
fn test_empty_rooms_send_no_sync() {
    let dispatcher = Dispatcher::new();
    let mut alice = Peer::join(&dispatcher, "R1", "A", "alice", "");
    settle(&dispatcher, &mut [&mut alice]);
    let mut bob = Peer::join(&dispatcher, "R1", "B", "bob", "");

    // Join out, Joined to both. No SyncCode from alice's empty editor.
    assert_eq!(settle(&dispatcher, &mut [&mut alice, &mut bob]), 3);
    assert_eq!(bob.controller.document(), "");
}

#[test]
fn test_empty_display_name_is_relayed_verbatim() {
    let dispatcher = Dispatcher::new();
    let mut alice = Peer::join(&dispatcher, "R1", "A", "alice", "");
    let mut anon = Peer::join(&dispatcher, "R1", "Z", "", "");
    settle(&dispatcher, &mut [&mut alice, &mut anon]);

    assert_eq!(alice.names(), vec!["alice", ""]);
    assert!(toasts(&alice.notices()).contains(&" has joined the room."));
}

#[test]
fn test_rooms_are_isolated() {
    let dispatcher = Dispatcher::new();
    let mut alice = Peer::join(&dispatcher, "R1", "A", "alice", "");
    let mut dave = Peer::join(&dispatcher, "R2", "D", "dave", "");
    settle(&dispatcher, &mut [&mut alice, &mut dave]);

    alice.controller.edit("secret");
    settle(&dispatcher, &mut [&mut alice, &mut dave]);

    assert_eq!(dave.controller.document(), "");
    assert_eq!(dave.names(), vec!["dave"]);
}
