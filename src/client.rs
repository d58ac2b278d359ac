//! Relay client
//!
//! Connects to a relay, sends the handshake, and exchanges framed text.
//! Rendering is left to the caller: received notices are returned as the
//! opaque strings the server produced.

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;

use crate::codec::NulCodec;
use crate::error::AppError;
use crate::message::Handshake;

/// Commands that end an interactive session
const QUIT_COMMANDS: [&str; 2] = ["/exit", "/quit"];

/// Check whether an input line asks to leave
pub fn is_quit_command(line: &str) -> bool {
    let line = line.trim();
    QUIT_COMMANDS.iter().any(|cmd| line.eq_ignore_ascii_case(cmd))
}

/// Client side of one relay connection
#[derive(Debug)]
pub struct RelayClient {
    framed: Framed<TcpStream, NulCodec>,
}

impl RelayClient {
    /// Connect and send the handshake
    ///
    /// The handshake is delimiter-terminated so the server never has to
    /// wait out the unterminated-handshake quiet period.
    pub async fn connect<A>(addr: A, handshake: &Handshake) -> Result<Self, AppError>
    where
        A: ToSocketAddrs,
    {
        let stream = TcpStream::connect(addr).await?;
        let mut framed = Framed::new(stream, NulCodec::new());
        framed.send(handshake.to_string()).await?;
        Ok(Self { framed })
    }

    /// Send one chat message; blank input is not sent
    pub async fn send(&mut self, text: &str) -> Result<(), AppError> {
        if text.trim().is_empty() {
            return Ok(());
        }
        self.framed.send(text).await
    }

    /// Next message from the server, or `None` once the server closes
    ///
    /// Cancel-safe: partially received frames stay buffered.
    pub async fn recv(&mut self) -> Result<Option<String>, AppError> {
        match self.framed.next().await {
            Some(frame) => Ok(Some(String::from_utf8_lossy(&frame?).into_owned())),
            None => Ok(None),
        }
    }

    /// Close the connection
    pub async fn close(mut self) -> Result<(), AppError> {
        SinkExt::<&str>::close(&mut self.framed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quit_commands() {
        assert!(is_quit_command("/exit"));
        assert!(is_quit_command("  /QUIT "));
        assert!(!is_quit_command("/exiting"));
        assert!(!is_quit_command("exit"));
    }
}
