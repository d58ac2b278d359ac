//! Command line configuration
//!
//! ```text
//! nyx_relay [host] [ADDR]                      host a relay (default 0.0.0.0:5050)
//! nyx_relay host ADDR CHANNEL                  host and reserve CHANNEL; passphrase on stdin
//! nyx_relay join HOST[:PORT] USERNAME CHANNEL  join a relay; passphrase on stdin
//! ```

use std::net::{IpAddr, SocketAddr};

use crate::error::AppError;

/// Default relay port
pub const DEFAULT_PORT: u16 = 5050;

/// Default bind address (all interfaces)
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5050";

const USAGE: &str = "nyx_relay [host] [ADDR] | nyx_relay host ADDR CHANNEL | \
                     nyx_relay join HOST[:PORT] USERNAME CHANNEL";

/// Host-mode settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Channel reserved for the operator before any client connects
    pub channel: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            channel: None,
        }
    }
}

/// Join-mode settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinConfig {
    /// `host:port` of the relay
    pub addr: String,
    pub username: String,
    pub channel: String,
}

/// What the binary was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Host(ServerConfig),
    Join(JoinConfig),
}

impl Mode {
    /// Parse arguments (program name already skipped)
    pub fn from_args<I>(args: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = String>,
    {
        let args: Vec<String> = args.into_iter().collect();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        match args.as_slice() {
            [] | ["host"] => Ok(Mode::Host(ServerConfig::default())),
            ["host", addr] => Ok(Mode::Host(ServerConfig {
                bind_addr: addr.to_string(),
                channel: None,
            })),
            ["host", _, ""] => Err(AppError::Usage(USAGE.to_string())),
            ["host", addr, channel] => Ok(Mode::Host(ServerConfig {
                bind_addr: addr.to_string(),
                channel: Some(channel.to_string()),
            })),
            ["join", host, username, channel] => Ok(Mode::Join(JoinConfig {
                addr: with_default_port(host)?,
                username: username.to_string(),
                channel: channel.to_string(),
            })),
            [addr] if *addr != "join" => Ok(Mode::Host(ServerConfig {
                bind_addr: addr.to_string(),
                channel: None,
            })),
            _ => Err(AppError::Usage(USAGE.to_string())),
        }
    }
}

/// Append [`DEFAULT_PORT`] when `host` names no port
fn with_default_port(host: &str) -> Result<String, AppError> {
    if host.is_empty() {
        return Err(AppError::InvalidAddress("empty host".to_string()));
    }
    if host.parse::<SocketAddr>().is_ok() {
        return Ok(host.to_string());
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT).to_string());
    }
    if host.contains(':') {
        return Ok(host.to_string());
    }
    Ok(format!("{}:{}", host, DEFAULT_PORT))
}
