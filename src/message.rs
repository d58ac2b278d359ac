//! Message protocol definitions
//!
//! Client → server: the one-time `username|channel|passphrase` handshake.
//! Everything after it is an opaque chat payload.
//!
//! Server → client: plain display strings. System notices carry a
//! `[System]` tag, chat lines a `[HH:MM]` timestamp and the sender's name.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local};

use crate::error::AppError;

/// Field separator inside the handshake payload
pub const HANDSHAKE_SEPARATOR: char = '|';

/// Handshake payload sent as the first message on every connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub username: String,
    pub channel: String,
    pub passphrase: String,
}

impl Handshake {
    pub fn new(
        username: impl Into<String>,
        channel: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            channel: channel.into(),
            passphrase: passphrase.into(),
        }
    }

    /// Parse raw handshake bytes (must be UTF-8)
    pub fn parse(raw: &[u8]) -> Result<Self, AppError> {
        let text = std::str::from_utf8(raw)
            .map_err(|_| AppError::MalformedHandshake("not valid UTF-8".to_string()))?;
        text.parse()
    }
}

impl FromStr for Handshake {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.trim().split(HANDSHAKE_SEPARATOR).collect();

        let &[username, channel, passphrase] = fields.as_slice() else {
            return Err(AppError::MalformedHandshake(format!(
                "expected 3 fields, got {}",
                fields.len()
            )));
        };

        if username.is_empty() {
            return Err(AppError::MalformedHandshake("empty username".to_string()));
        }
        if channel.is_empty() {
            return Err(AppError::MalformedHandshake("empty channel".to_string()));
        }

        Ok(Self::new(username, channel, passphrase))
    }
}

impl fmt::Display for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.username,
            self.channel,
            self.passphrase,
            sep = HANDSHAKE_SEPARATOR
        )
    }
}

/// Server → Client message
///
/// Rendered to text with `Display`; clients treat the text as opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Private greeting after a successful join
    Welcome { channel: String },
    /// Someone else joined the channel
    Joined { username: String, channel: String },
    /// Someone left the channel
    Left { username: String },
    /// Handshake passphrase did not match
    IncorrectPassphrase,
    /// Chat line, already time-stamped
    Chat {
        timestamp: String,
        from: String,
        content: String,
    },
}

impl ServerMessage {
    /// Build a chat line stamped with the current local time
    pub fn chat(from: impl Into<String>, content: impl Into<String>) -> Self {
        Self::chat_at(Local::now(), from, content)
    }

    /// Build a chat line stamped with `at` (`HH:MM`)
    pub fn chat_at(
        at: DateTime<Local>,
        from: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        ServerMessage::Chat {
            timestamp: at.format("%H:%M").to_string(),
            from: from.into(),
            content: content.into(),
        }
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Welcome { channel } => {
                write!(f, "[System] Welcome to channel '{}'", channel)
            }
            ServerMessage::Joined { username, channel } => {
                write!(f, "[System] {} joined channel '{}'", username, channel)
            }
            ServerMessage::Left { username } => {
                write!(f, "[System] {} left the channel", username)
            }
            ServerMessage::IncorrectPassphrase => write!(f, "[!] Incorrect passphrase"),
            ServerMessage::Chat {
                timestamp,
                from,
                content,
            } => write!(f, "[{}] {}: {}", timestamp, from, content),
        }
    }
}

/// Convert AppError to a client notice where one exists
///
/// Only authentication failures are reported to the client; everything
/// else closes the connection silently.
impl TryFrom<&AppError> for ServerMessage {
    type Error = ();

    fn try_from(err: &AppError) -> Result<Self, Self::Error> {
        match err {
            AppError::IncorrectPassphrase => Ok(ServerMessage::IncorrectPassphrase),
            _ => Err(()),
        }
    }
}
