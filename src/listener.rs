//! TCP listener and graceful shutdown
//!
//! Accepts connections and spawns one handler task per connection. When
//! the shutdown future resolves it stops accepting, has the ChatServer
//! close every live session, and waits for the connection tasks to drain.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::handler::handle_connection;
use crate::registry::ChannelRegistry;
use crate::server::{ChatServer, ServerCommand};

/// Channel buffer size for server commands
pub const CHANNEL_BUFFER_SIZE: usize = 256;

/// How long connection tasks get to finish after shutdown
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Accept loop bound to one TCP socket
pub struct Listener {
    listener: TcpListener,
    cmd_tx: mpsc::Sender<ServerCommand>,
    connections: JoinSet<()>,
}

impl Listener {
    pub fn new(listener: TcpListener, cmd_tx: mpsc::Sender<ServerCommand>) -> Self {
        Self {
            listener,
            cmd_tx,
            connections: JoinSet::new(),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept until `shutdown` resolves, then close everything
    ///
    /// Accept errors on individual connections are logged and skipped.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            info!("New connection from {}", addr);
                            let cmd_tx = self.cmd_tx.clone();

                            // Spawn handler task for each connection
                            self.connections.spawn(async move {
                                if let Err(e) = handle_connection(stream, cmd_tx).await {
                                    error!("Connection handler error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                Some(_) = self.connections.join_next(), if !self.connections.is_empty() => {}
            }
        }

        let Self {
            listener,
            cmd_tx,
            mut connections,
        } = self;
        drop(listener);

        let _ = cmd_tx.send(ServerCommand::Shutdown).await;
        drain_connections(&mut connections).await;
    }
}

/// Wait for connection tasks, aborting whatever outlives the grace period
async fn drain_connections(connections: &mut JoinSet<()>) {
    debug!("Waiting for {} connection tasks", connections.len());

    let drained = timeout(SHUTDOWN_GRACE, async {
        while connections.join_next().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        warn!(
            "Aborting {} connection tasks after {:?}",
            connections.len(),
            SHUTDOWN_GRACE
        );
        connections.shutdown().await;
    }
}

/// Run the relay on `listener` until `shutdown` resolves
///
/// Starts the ChatServer actor, runs the accept loop, and returns once the
/// actor and every connection task have stopped.
pub async fn serve<F>(listener: TcpListener, shutdown: F) -> Result<(), AppError>
where
    F: Future<Output = ()>,
{
    serve_with_channels(listener, ChannelRegistry::new(), shutdown).await
}

/// Like [`serve`], starting from a registry with channels already reserved
pub async fn serve_with_channels<F>(
    listener: TcpListener,
    channels: ChannelRegistry,
    shutdown: F,
) -> Result<(), AppError>
where
    F: Future<Output = ()>,
{
    let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    let server = tokio::spawn(ChatServer::with_channels(cmd_rx, channels).run());

    let listener = Listener::new(listener, cmd_tx);
    info!("Relay listening on {}", listener.local_addr()?);

    listener.run(shutdown).await;

    if let Err(e) = server.await {
        error!("ChatServer task failed: {}", e);
    }

    info!("Relay stopped");
    Ok(())
}
