//! ChatServer actor - central state management
//!
//! Owns the channel registry and the session table. Connection handlers
//! never touch either directly; they send `ServerCommand`s and the actor
//! processes them one at a time, so every registration, removal and
//! broadcast is serialized with respect to all the others.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::broadcast::{announce_joined, broadcast, remove_session};
use crate::error::{AppError, SendError};
use crate::message::{Handshake, ServerMessage};
use crate::registry::{Accepted, ChannelRegistry};
use crate::session::{Session, SessionTable};
use crate::types::SessionId;

/// Commands sent from handlers to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// Authenticate a handshake and, if accepted, register the session
    Join {
        session_id: SessionId,
        handshake: Handshake,
        sender: mpsc::Sender<ServerMessage>,
        reply: oneshot::Sender<Result<Accepted, AppError>>,
    },
    /// Chat payload from an active session
    Chat {
        session_id: SessionId,
        content: String,
    },
    /// Connection closed; safe to send for sessions that never registered
    Disconnect {
        session_id: SessionId,
    },
    /// Current channel and session counts
    Stats {
        reply: oneshot::Sender<ServerStats>,
    },
    /// Tear down every session and stop the actor
    Shutdown,
}

/// Snapshot of the actor's tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerStats {
    pub channels: usize,
    pub sessions: usize,
}

/// The main ChatServer actor
///
/// Manages all shared state and processes commands from connection handlers.
pub struct ChatServer {
    /// Channel name -> passphrase
    channels: ChannelRegistry,
    /// Live sessions: SessionId -> Session
    sessions: SessionTable,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>) -> Self {
        Self::with_channels(receiver, ChannelRegistry::new())
    }

    /// Create a ChatServer whose registry already holds reserved channels
    pub fn with_channels(
        receiver: mpsc::Receiver<ServerCommand>,
        channels: ChannelRegistry,
    ) -> Self {
        Self {
            channels,
            sessions: SessionTable::new(),
            receiver,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Processes commands until `Shutdown` arrives or all senders are dropped.
    pub async fn run(mut self) {
        info!("ChatServer started");

        while let Some(cmd) = self.receiver.recv().await {
            if let ServerCommand::Shutdown = cmd {
                self.handle_shutdown();
                break;
            }
            self.handle_command(cmd);
        }

        info!("ChatServer shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Join {
                session_id,
                handshake,
                sender,
                reply,
            } => {
                let result = self.handle_join(session_id, handshake, sender);
                let _ = reply.send(result);
            }
            ServerCommand::Chat {
                session_id,
                content,
            } => {
                self.handle_chat(session_id, content);
            }
            ServerCommand::Disconnect { session_id } => {
                self.handle_disconnect(session_id);
            }
            ServerCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            ServerCommand::Shutdown => self.handle_shutdown(),
        }
    }

    /// Validate the handshake, then register, welcome and announce
    fn handle_join(
        &mut self,
        session_id: SessionId,
        handshake: Handshake,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<Accepted, AppError> {
        let Handshake {
            username,
            channel,
            passphrase,
        } = handshake;

        let outcome = match self.channels.join_or_create(&channel, &passphrase) {
            Ok(outcome) => outcome,
            Err(e) => {
                info!("{} ({}) rejected from channel '{}': {}", username, session_id, channel, e);
                return Err(e);
            }
        };

        if outcome == Accepted::Created {
            info!("Channel '{}' created by {}", channel, username);
        }

        let session = Session::new(session_id, username, channel, sender);
        let _ = session.send(ServerMessage::Welcome {
            channel: session.channel.clone(),
        });

        info!("{} joined channel '{}'", session.username, session.channel);
        self.sessions.register(session);
        announce_joined(&mut self.sessions, session_id);

        debug!(
            "Total sessions: {}, Total channels: {}",
            self.sessions.len(),
            self.channels.len()
        );

        Ok(outcome)
    }

    /// Stamp, echo, fan out and log one chat message
    fn handle_chat(&mut self, session_id: SessionId, content: String) {
        let Some(session) = self.sessions.get(session_id) else {
            return;
        };

        let channel = session.channel.clone();
        let msg = ServerMessage::chat(session.username.as_str(), content.as_str());

        info!("[{}] {}: {}", channel, session.username, content);

        // Echo copy for the sender
        if let Err(SendError::ChannelClosed) = session.send(msg.clone()) {
            remove_session(&mut self.sessions, session_id);
            return;
        }

        broadcast(&mut self.sessions, &msg, &channel, Some(session_id));
    }

    /// Handle connection close; idempotent
    fn handle_disconnect(&mut self, session_id: SessionId) {
        if remove_session(&mut self.sessions, session_id).is_none() {
            debug!("Disconnect for unregistered session {}", session_id);
        }
    }

    /// Close every live session
    ///
    /// Dropping a session drops its outbound sender, which lets the
    /// connection's writer flush what is queued and close the socket.
    fn handle_shutdown(&mut self) {
        info!("Closing {} live sessions", self.sessions.len());
        for session_id in self.sessions.ids() {
            remove_session(&mut self.sessions, session_id);
        }
    }

    fn stats(&self) -> ServerStats {
        ServerStats {
            channels: self.channels.len(),
            sessions: self.sessions.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Harness {
        cmd_tx: mpsc::Sender<ServerCommand>,
        task: tokio::task::JoinHandle<()>,
    }

    impl Harness {
        fn start() -> Self {
            let (cmd_tx, cmd_rx) = mpsc::channel(64);
            let task = tokio::spawn(ChatServer::new(cmd_rx).run());
            Self { cmd_tx, task }
        }

        async fn join(
            &self,
            username: &str,
            channel: &str,
            passphrase: &str,
        ) -> (SessionId, Result<Accepted, AppError>, mpsc::Receiver<ServerMessage>) {
            let session_id = SessionId::new();
            let (tx, rx) = mpsc::channel(32);
            let (reply_tx, reply_rx) = oneshot::channel();
            self.cmd_tx
                .send(ServerCommand::Join {
                    session_id,
                    handshake: Handshake::new(username, channel, passphrase),
                    sender: tx,
                    reply: reply_tx,
                })
                .await
                .unwrap();
            (session_id, reply_rx.await.unwrap(), rx)
        }

        async fn send(&self, cmd: ServerCommand) {
            self.cmd_tx.send(cmd).await.unwrap();
        }

        async fn stats(&self) -> ServerStats {
            let (reply, rx) = oneshot::channel();
            self.send(ServerCommand::Stats { reply }).await;
            rx.await.unwrap()
        }
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg.to_string());
        }
        out
    }

    #[tokio::test]
    async fn test_join_creates_channel_and_welcomes() {
        let server = Harness::start();

        let (_id, result, mut rx) = server.join("alice", "dev", "x").await;
        assert_eq!(result.unwrap(), Accepted::Created);
        assert_eq!(drain(&mut rx), vec!["[System] Welcome to channel 'dev'"]);

        let stats = server.stats().await;
        assert_eq!(stats, ServerStats { channels: 1, sessions: 1 });
    }

    #[tokio::test]
    async fn test_wrong_passphrase_creates_no_session() {
        let server = Harness::start();
        let (_alice, _, mut alice_rx) = server.join("alice", "dev", "x").await;
        drain(&mut alice_rx);

        let (_eve, result, mut eve_rx) = server.join("eve", "dev", "y").await;
        assert!(matches!(result, Err(AppError::IncorrectPassphrase)));

        let stats = server.stats().await;
        assert_eq!(stats, ServerStats { channels: 1, sessions: 1 });
        assert!(drain(&mut eve_rx).is_empty());
        assert!(drain(&mut alice_rx).is_empty());

        // Channel still accepts the first passphrase
        let (_bob, result, _bob_rx) = server.join("bob", "dev", "x").await;
        assert_eq!(result.unwrap(), Accepted::Joined);
    }

    #[tokio::test]
    async fn test_chat_echoes_and_broadcasts() {
        let server = Harness::start();
        let (alice, _, mut alice_rx) = server.join("alice", "dev", "x").await;
        let (_bob, _, mut bob_rx) = server.join("bob", "dev", "x").await;

        assert_eq!(drain(&mut alice_rx)[1], "[System] bob joined channel 'dev'");
        drain(&mut bob_rx);

        server
            .send(ServerCommand::Chat {
                session_id: alice,
                content: "hello".to_string(),
            })
            .await;
        server.stats().await;

        let echo = drain(&mut alice_rx);
        let seen = drain(&mut bob_rx);
        assert_eq!(echo.len(), 1);
        assert!(echo[0].ends_with("] alice: hello"));
        assert_eq!(seen, echo);
    }

    #[tokio::test]
    async fn test_chat_keeps_surrounding_whitespace() {
        let server = Harness::start();
        let (alice, _, mut alice_rx) = server.join("alice", "dev", "x").await;
        drain(&mut alice_rx);

        server
            .send(ServerCommand::Chat {
                session_id: alice,
                content: "  spaced  ".to_string(),
            })
            .await;
        server.stats().await;

        let echo = drain(&mut alice_rx);
        assert!(echo[0].ends_with("] alice:   spaced  "), "got {:?}", echo[0]);
    }

    #[tokio::test]
    async fn test_reserved_channel_rejects_other_passphrase() {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let mut channels = ChannelRegistry::new();
        channels.reserve("lobby", "hostpw");
        let task = tokio::spawn(ChatServer::with_channels(cmd_rx, channels).run());
        let server = Harness { cmd_tx, task };

        assert_eq!(server.stats().await.channels, 1);

        let (_eve, result, _eve_rx) = server.join("eve", "lobby", "guess").await;
        assert!(matches!(result, Err(AppError::IncorrectPassphrase)));

        let (_bob, result, _bob_rx) = server.join("bob", "lobby", "hostpw").await;
        assert_eq!(result.unwrap(), Accepted::Joined);
    }

    #[tokio::test]
    async fn test_disconnect_announces_once() {
        let server = Harness::start();
        let (_alice, _, mut alice_rx) = server.join("alice", "dev", "x").await;
        let (bob, _, _bob_rx) = server.join("bob", "dev", "x").await;
        drain(&mut alice_rx);

        server.send(ServerCommand::Disconnect { session_id: bob }).await;
        server.send(ServerCommand::Disconnect { session_id: bob }).await;
        let stats = server.stats().await;

        assert_eq!(drain(&mut alice_rx), vec!["[System] bob left the channel"]);
        assert_eq!(stats.sessions, 1);
    }

    #[tokio::test]
    async fn test_disconnect_of_unknown_session_is_noop() {
        let server = Harness::start();
        server
            .send(ServerCommand::Disconnect {
                session_id: SessionId::new(),
            })
            .await;
        assert_eq!(server.stats().await.sessions, 0);
    }

    #[tokio::test]
    async fn test_shutdown_closes_all_sessions() {
        let server = Harness::start();
        let (_alice, _, mut alice_rx) = server.join("alice", "dev", "x").await;
        let (_bob, _, mut bob_rx) = server.join("bob", "ops", "y").await;

        server.send(ServerCommand::Shutdown).await;
        server.task.await.unwrap();

        // Queued notices are still readable, then the queue reports closed
        while alice_rx.recv().await.is_some() {}
        while bob_rx.recv().await.is_some() {}
    }
}
