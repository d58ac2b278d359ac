//! TCP connection handler
//!
//! Drives one connection through `AwaitingAuth → Active → Closed`:
//! reads the handshake, asks the ChatServer to admit the session, then
//! pumps frames in both directions until either side ends. The
//! disconnect notice to the ChatServer is sent on every exit path.

use std::time::Duration;

use bytes::{Buf, BytesMut};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_util::codec::{Framed, FramedParts};
use tracing::{debug, info};

use crate::codec::{NulCodec, DELIMITER};
use crate::error::AppError;
use crate::message::{Handshake, ServerMessage, HANDSHAKE_SEPARATOR};
use crate::server::ServerCommand;
use crate::types::SessionId;

/// Longest handshake accepted before the connection is dropped
pub const MAX_HANDSHAKE_LEN: usize = 1024;

/// Quiet period that ends an unterminated handshake
pub const HANDSHAKE_SETTLE: Duration = Duration::from_millis(100);

/// Per-session outbound queue depth
const OUTBOUND_BUFFER: usize = 64;

/// Handle a new TCP connection
///
/// Returns an error only when the ChatServer is unreachable; handshake
/// failures, rejections and disconnects are normal endings.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let session_id = SessionId::new();
    debug!("Session {} opened from {}", session_id, peer_addr);

    let result = run_session(stream, session_id, &cmd_tx).await;

    // Closed: unconditional and idempotent on the ChatServer side
    let _ = cmd_tx
        .send(ServerCommand::Disconnect { session_id })
        .await;

    match result {
        Ok(()) => {
            info!("Session {} from {} disconnected", session_id, peer_addr);
            Ok(())
        }
        Err(AppError::ChannelSend) => Err(AppError::ChannelSend),
        Err(e) => {
            debug!("Session {} from {} closed: {}", session_id, peer_addr, e);
            Ok(())
        }
    }
}

/// AwaitingAuth and Active states
async fn run_session(
    mut stream: TcpStream,
    session_id: SessionId,
    cmd_tx: &mpsc::Sender<ServerCommand>,
) -> Result<(), AppError> {
    let (handshake, leftover) = read_handshake(&mut stream).await?;

    // Anything the client sent after the handshake is already buffered
    let mut parts = FramedParts::new::<String>(stream, NulCodec::new());
    parts.read_buf = leftover;
    let mut framed = Framed::from_parts(parts);

    // Channel for server -> client messages
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_BUFFER);
    let (reply_tx, reply_rx) = oneshot::channel();

    cmd_tx
        .send(ServerCommand::Join {
            session_id,
            handshake,
            sender: msg_tx,
            reply: reply_tx,
        })
        .await
        .map_err(|_| AppError::ChannelSend)?;

    if let Err(e) = reply_rx.await.map_err(|_| AppError::ChannelSend)? {
        if let Ok(notice) = ServerMessage::try_from(&e) {
            framed.send(notice.to_string()).await?;
        }
        return Err(e);
    }

    let (mut sink, mut source) = framed.split::<String>();
    let cmd_tx_read = cmd_tx.clone();

    // Read task (frames -> ServerCommand::Chat)
    let mut read_task = tokio::spawn(async move {
        while let Some(frame) = source.next().await {
            match frame {
                Ok(payload) => {
                    let text = String::from_utf8_lossy(&payload);
                    if text.trim().is_empty() {
                        continue;
                    }

                    let cmd = ServerCommand::Chat {
                        session_id,
                        content: text.into_owned(),
                    };
                    if cmd_tx_read.send(cmd).await.is_err() {
                        debug!("Server closed, ending read task for {}", session_id);
                        break;
                    }
                }
                Err(e) => {
                    debug!("Read error for {}: {}", session_id, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", session_id);
    });

    // Write task (ServerMessage -> frames)
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            if let Err(e) = sink.send(msg.to_string()).await {
                debug!("Write failed for {}: {}", session_id, e);
                break;
            }
        }
        debug!("Write task ended for {}", session_id);

        let _ = sink.close().await;
    });

    // Wait for either task to complete, then stop the other
    tokio::select! {
        _ = &mut read_task => {
            debug!("Read task completed for {}", session_id);
        }
        _ = &mut write_task => {
            debug!("Write task completed for {}", session_id);
        }
    }
    read_task.abort();
    write_task.abort();

    Ok(())
}

/// Read the `username|channel|passphrase` payload
///
/// The handshake ends at the first delimiter. When the first read already
/// holds every field and no delimiter, the handshake is instead accepted
/// once the peer has gone quiet for [`HANDSHAKE_SETTLE`]. A first read
/// missing a field waits for the delimiter or EOF. Returns the bytes
/// received past the handshake.
pub async fn read_handshake<S>(stream: &mut S) -> Result<(Handshake, BytesMut), AppError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(MAX_HANDSHAKE_LEN);
    let mut first_read = true;
    let mut settle = false;

    loop {
        if let Some(pos) = buf.iter().position(|b| *b == DELIMITER) {
            let raw = buf.split_to(pos);
            buf.advance(1);
            return Ok((Handshake::parse(&raw)?, buf));
        }

        if buf.len() > MAX_HANDSHAKE_LEN {
            return Err(AppError::MalformedHandshake(format!(
                "longer than {} bytes",
                MAX_HANDSHAKE_LEN
            )));
        }

        let read = if settle {
            match timeout(HANDSHAKE_SETTLE, stream.read_buf(&mut buf)).await {
                Ok(read) => read?,
                Err(_) => {
                    let raw = buf.split();
                    return Ok((Handshake::parse(&raw)?, buf));
                }
            }
        } else {
            stream.read_buf(&mut buf).await?
        };

        if read == 0 {
            return Err(AppError::ConnectionClosed);
        }

        if first_read {
            first_read = false;
            let separators = buf
                .iter()
                .filter(|b| **b == HANDSHAKE_SEPARATOR as u8)
                .count();
            settle = separators >= 2;
        }
    }
}
