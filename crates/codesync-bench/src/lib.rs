//! Shared fixtures for the codesync benchmarks.

use codesync_core::{Dispatcher, Outbox, Session};
use codesync_protocol::Frame;

/// A joined connection with its outbox.
pub struct Member {
    pub session: Session,
    pub outbox: Outbox,
}

impl Member {
    /// Discard everything queued for this member.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        while self.outbox.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }
}

/// Join `size` connections to `room` and drain the roster broadcasts.
pub fn populate(dispatcher: &Dispatcher, room: &str, size: usize) -> Vec<Member> {
    let mut members: Vec<Member> = (0..size)
        .map(|i| {
            let (mut session, outbox) = dispatcher.connect(format!("{room}-conn-{i}"));
            dispatcher
                .dispatch(&mut session, Frame::join(room, format!("user-{i}")))
                .expect("fresh session accepts join");
            Member { session, outbox }
        })
        .collect();

    for member in &mut members {
        member.drain();
    }
    members
}

/// A document of roughly `len` bytes.
#[must_use]
pub fn document(len: usize) -> String {
    "let x = 1;\n".repeat(len / 11 + 1)[..len].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_populate_joins_every_member() {
        let dispatcher = Dispatcher::new();
        let mut members = populate(&dispatcher, "R1", 3);

        assert_eq!(dispatcher.registry().participant_count("R1"), 3);
        assert!(members.iter_mut().all(|m| m.drain() == 0));
    }
}
