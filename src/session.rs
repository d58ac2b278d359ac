//! Sessions and the session table
//!
//! A `Session` is one authenticated connection: its handle, username,
//! channel, and the outbound queue feeding the connection's writer task.
//! The `SessionTable` is the single source of truth for who is where.
//! Channel, username and peer membership live in one entry, so they are
//! always inserted and removed together.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::SessionId;

/// Authenticated, active connection
#[derive(Debug)]
pub struct Session {
    /// Connection handle
    pub id: SessionId,
    /// Display name (not required to be unique)
    pub username: String,
    /// Channel joined at handshake, fixed for the session's lifetime
    pub channel: String,
    /// Server → Client message queue
    sender: mpsc::Sender<ServerMessage>,
}

impl Session {
    pub fn new(
        id: SessionId,
        username: String,
        channel: String,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Self {
        Self {
            id,
            username,
            channel,
            sender,
        }
    }

    /// Queue a message for this session's writer task
    ///
    /// Never waits: a full queue or a finished writer is reported instead.
    pub fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }
}

/// Live sessions keyed by handle
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<SessionId, Session>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session; replaces any previous entry for the same handle
    pub fn register(&mut self, session: Session) {
        self.sessions.insert(session.id, session);
    }

    /// Remove a session and everything known about it
    ///
    /// Idempotent: returns `None` when the handle is not registered.
    pub fn unregister(&mut self, id: SessionId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn lookup_channel(&self, id: SessionId) -> Option<&str> {
        self.sessions.get(&id).map(|s| s.channel.as_str())
    }

    pub fn lookup_username(&self, id: SessionId) -> Option<&str> {
        self.sessions.get(&id).map(|s| s.username.as_str())
    }

    /// Snapshot of the handles in `channel`, minus `exclude`
    pub fn members(&self, channel: &str, exclude: Option<SessionId>) -> Vec<SessionId> {
        self.sessions
            .values()
            .filter(|s| s.channel == channel && Some(s.id) != exclude)
            .map(|s| s.id)
            .collect()
    }

    /// Snapshot of every registered handle
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(username: &str, channel: &str) -> (Session, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(8);
        let session = Session::new(SessionId::new(), username.into(), channel.into(), tx);
        (session, rx)
    }

    #[test]
    fn test_register_and_lookup() {
        let mut table = SessionTable::new();
        let (alice, _rx) = session("alice", "dev");
        let id = alice.id;

        table.register(alice);

        assert_eq!(table.lookup_channel(id), Some("dev"));
        assert_eq!(table.lookup_username(id), Some("alice"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_unregister_removes_everything_once() {
        let mut table = SessionTable::new();
        let (alice, _rx) = session("alice", "dev");
        let id = alice.id;
        table.register(alice);

        assert!(table.unregister(id).is_some());
        assert!(table.lookup_channel(id).is_none());
        assert!(table.lookup_username(id).is_none());
        assert!(table.is_empty());

        // Second removal is a no-op
        assert!(table.unregister(id).is_none());
    }

    #[test]
    fn test_members_filters_channel_and_excluded() {
        let mut table = SessionTable::new();
        let (alice, _a) = session("alice", "dev");
        let (bob, _b) = session("bob", "dev");
        let (carol, _c) = session("carol", "ops");
        let (alice_id, bob_id) = (alice.id, bob.id);
        table.register(alice);
        table.register(bob);
        table.register(carol);

        assert_eq!(table.members("dev", Some(alice_id)), vec![bob_id]);
        assert_eq!(table.members("dev", None).len(), 2);
        assert!(table.members("nowhere", None).is_empty());
    }

    #[test]
    fn test_send_reports_closed_and_full() {
        let (tx, rx) = mpsc::channel(1);
        let s = Session::new(SessionId::new(), "a".into(), "c".into(), tx);

        assert!(s.send(ServerMessage::IncorrectPassphrase).is_ok());
        assert_eq!(
            s.send(ServerMessage::IncorrectPassphrase),
            Err(SendError::QueueFull)
        );

        drop(rx);
        assert_eq!(
            s.send(ServerMessage::IncorrectPassphrase),
            Err(SendError::ChannelClosed)
        );
    }
}
