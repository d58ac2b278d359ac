//! Error types for the relay
//!
//! Defines application-level errors and outbound delivery errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers fatal connection errors (the connection is closed) and
/// authentication outcomes reported back to a single client.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal for the connection, or for the listener at bind time)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - coordinator is gone)
    #[error("Channel send error")]
    ChannelSend,

    /// First payload on a connection could not be parsed
    #[error("Malformed handshake: {0}")]
    MalformedHandshake(String),

    /// Channel exists and the supplied passphrase does not match
    #[error("Incorrect passphrase")]
    IncorrectPassphrase,

    /// Peer closed the connection before a complete payload arrived
    #[error("Connection closed")]
    ConnectionClosed,

    /// A frame grew past the maximum length without a delimiter
    #[error("Frame exceeds {max} bytes")]
    FrameTooLong { max: usize },

    /// Payload contains the reserved delimiter byte
    #[error("Payload contains the frame delimiter")]
    DelimiterInPayload,

    /// Address could not be parsed or resolved
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Command line could not be understood
    #[error("Usage: {0}")]
    Usage(String),
}

/// Outbound delivery errors
///
/// Occurs when queueing a frame for a session's writer task.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The writer task has ended (peer disconnected or write failed)
    #[error("Channel closed")]
    ChannelClosed,

    /// The peer is not draining its queue fast enough
    #[error("Outbound queue full")]
    QueueFull,
}
