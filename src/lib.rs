//! Multi-channel TCP text relay
//!
//! Clients connect over plain TCP, name a channel and its passphrase, and
//! every message they send is relayed to the other members of that channel.
//!
//! # Features
//! - `0x00`-delimited framing over a raw byte stream
//! - Channels created on first join, gated by a shared passphrase
//! - Echo to the sender plus fan-out to the rest of the channel
//! - Join / leave announcements
//! - Dead peers evicted on failed delivery
//! - Graceful shutdown that closes every live session
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` owns the channel registry and session table
//! - Each connection has a `handler` task communicating with the server
//! - No locks needed - all state access goes through message passing
//!
//! The passphrase is stored and compared as plaintext and travels
//! unencrypted; it keeps honest users apart and nothing more.
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use nyx_relay::serve;
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("0.0.0.0:5050").await.unwrap();
//!     serve(listener, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//!     .unwrap();
//! }
//! ```

pub mod broadcast;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod listener;
pub mod message;
pub mod registry;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use client::{is_quit_command, RelayClient};
pub use codec::NulCodec;
pub use config::{JoinConfig, Mode, ServerConfig, DEFAULT_PORT};
pub use error::{AppError, SendError};
pub use handler::handle_connection;
pub use listener::{serve, serve_with_channels, Listener};
pub use message::{Handshake, ServerMessage};
pub use registry::{Accepted, ChannelRegistry};
pub use server::{ChatServer, ServerCommand, ServerStats};
pub use session::{Session, SessionTable};
pub use types::SessionId;
