//! Channel fan-out
//!
//! Delivers a message to every session in a channel except one, and evicts
//! any session whose delivery fails. Eviction goes through the same
//! teardown as a normal disconnect, so the rest of the channel still hears
//! that the dead peer left.

use tracing::{debug, info, warn};

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::session::{Session, SessionTable};
use crate::types::SessionId;

/// Send `msg` to every session in `channel` other than `exclude`
///
/// Returns the number of sessions the message was queued for. Sessions
/// whose writer has gone away are removed from the table on the spot.
pub fn broadcast(
    table: &mut SessionTable,
    msg: &ServerMessage,
    channel: &str,
    exclude: Option<SessionId>,
) -> usize {
    let mut delivered = 0;

    for id in table.members(channel, exclude) {
        // An earlier eviction in this loop may already have taken it
        let Some(session) = table.get(id) else {
            continue;
        };

        match session.send(msg.clone()) {
            Ok(()) => delivered += 1,
            Err(SendError::QueueFull) => {
                warn!("Dropping message for {} ({}): queue full", session.username, id);
            }
            Err(SendError::ChannelClosed) => {
                debug!("Delivery to {} failed, evicting", id);
                remove_session(table, id);
            }
        }
    }

    delivered
}

/// Tell the rest of the channel that `session` arrived
pub fn announce_joined(table: &mut SessionTable, session_id: SessionId) -> usize {
    let Some(session) = table.get(session_id) else {
        return 0;
    };

    let msg = ServerMessage::Joined {
        username: session.username.clone(),
        channel: session.channel.clone(),
    };
    let channel = session.channel.clone();

    broadcast(table, &msg, &channel, Some(session_id))
}

/// Tell the rest of the channel that an already-removed `session` left
pub fn announce_left(table: &mut SessionTable, session: &Session) -> usize {
    let msg = ServerMessage::Left {
        username: session.username.clone(),
    };
    broadcast(table, &msg, &session.channel, Some(session.id))
}

/// Unregister a session and announce its departure
///
/// Idempotent: a handle that is not registered yields `None` and sends
/// nothing.
pub fn remove_session(table: &mut SessionTable, id: SessionId) -> Option<Session> {
    let session = table.unregister(id)?;

    info!(
        "{} left channel '{}' ({} sessions remain)",
        session.username,
        session.channel,
        table.len()
    );
    announce_left(table, &session);

    Some(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn join(
        table: &mut SessionTable,
        username: &str,
        channel: &str,
    ) -> (SessionId, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(16);
        let id = SessionId::new();
        table.register(Session::new(id, username.into(), channel.into(), tx));
        (id, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg.to_string());
        }
        out
    }

    #[test]
    fn test_broadcast_skips_sender_and_other_channels() {
        let mut table = SessionTable::new();
        let (alice, mut alice_rx) = join(&mut table, "alice", "dev");
        let (_bob, mut bob_rx) = join(&mut table, "bob", "dev");
        let (_carol, mut carol_rx) = join(&mut table, "carol", "ops");

        let msg = ServerMessage::chat("alice", "hi");
        assert_eq!(broadcast(&mut table, &msg, "dev", Some(alice)), 1);

        assert!(drain(&mut alice_rx).is_empty());
        assert_eq!(drain(&mut bob_rx), vec![msg.to_string()]);
        assert!(drain(&mut carol_rx).is_empty());
    }

    #[test]
    fn test_broadcast_evicts_dead_peer_and_announces() {
        let mut table = SessionTable::new();
        let (alice, mut alice_rx) = join(&mut table, "alice", "dev");
        let (bob, bob_rx) = join(&mut table, "bob", "dev");
        let (_carol, mut carol_rx) = join(&mut table, "carol", "dev");

        drop(bob_rx);

        let msg = ServerMessage::chat("alice", "anyone?");
        assert_eq!(broadcast(&mut table, &msg, "dev", Some(alice)), 1);

        assert!(table.get(bob).is_none());
        assert_eq!(table.len(), 2);

        // Alice only hears that bob left; carol hears the chat and the leave
        assert_eq!(drain(&mut alice_rx), vec!["[System] bob left the channel"]);
        let carol_saw = drain(&mut carol_rx);
        assert!(carol_saw.contains(&msg.to_string()));
        assert!(carol_saw.contains(&"[System] bob left the channel".to_string()));
    }

    #[test]
    fn test_announce_joined_excludes_joiner() {
        let mut table = SessionTable::new();
        let (_alice, mut alice_rx) = join(&mut table, "alice", "dev");
        let (bob, mut bob_rx) = join(&mut table, "bob", "dev");

        assert_eq!(announce_joined(&mut table, bob), 1);
        assert_eq!(drain(&mut alice_rx), vec!["[System] bob joined channel 'dev'"]);
        assert!(drain(&mut bob_rx).is_empty());
    }

    #[test]
    fn test_remove_session_is_idempotent() {
        let mut table = SessionTable::new();
        let (_alice, mut alice_rx) = join(&mut table, "alice", "dev");
        let (bob, _bob_rx) = join(&mut table, "bob", "dev");

        assert!(remove_session(&mut table, bob).is_some());
        assert!(remove_session(&mut table, bob).is_none());

        assert_eq!(drain(&mut alice_rx), vec!["[System] bob left the channel"]);
    }

    #[test]
    fn test_broadcast_to_empty_channel() {
        let mut table = SessionTable::new();
        let (alice, _rx) = join(&mut table, "alice", "dev");

        let msg = ServerMessage::chat("alice", "echo?");
        assert_eq!(broadcast(&mut table, &msg, "dev", Some(alice)), 0);
    }
}
