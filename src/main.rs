//! Nyx relay - Entry Point
//!
//! Host mode starts the listener and ChatServer actor and runs until
//! Ctrl-C. Join mode connects to a relay and bridges stdin/stdout.

use std::env;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use nyx_relay::{
    is_quit_command, serve_with_channels, AppError, ChannelRegistry, Handshake, JoinConfig, Mode,
    RelayClient, ServerConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=nyx_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("nyx_relay=info")),
        )
        .init();

    match Mode::from_args(env::args().skip(1))? {
        Mode::Host(config) => host(config).await?,
        Mode::Join(config) => join(config).await?,
    }

    Ok(())
}

/// Run the relay until Ctrl-C
///
/// With a channel named, the first stdin line is its passphrase.
async fn host(config: ServerConfig) -> Result<(), AppError> {
    let mut channels = ChannelRegistry::new();
    if let Some(channel) = &config.channel {
        let passphrase = read_passphrase(&mut BufReader::new(tokio::io::stdin()).lines()).await?;
        channels.reserve(channel, &passphrase);
        info!("Reserved channel '{}'", channel);
    }

    let listener = TcpListener::bind(&config.bind_addr).await?;

    serve_with_channels(listener, channels, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

/// Join a relay; the first stdin line is the passphrase
async fn join(config: JoinConfig) -> Result<(), AppError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let passphrase = read_passphrase(&mut lines).await?;

    let handshake = Handshake::new(config.username, config.channel, passphrase);
    let mut client = RelayClient::connect(&config.addr, &handshake).await?;
    info!("Connected to {} as '{}'", config.addr, handshake.username);

    loop {
        tokio::select! {
            incoming = client.recv() => match incoming? {
                Some(text) => println!("{}", text),
                None => {
                    info!("Connection closed by server");
                    return Ok(());
                }
            },
            line = lines.next_line() => match line? {
                Some(line) if is_quit_command(&line) => break,
                Some(line) => client.send(&line).await?,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.close().await
}

async fn read_passphrase<R>(lines: &mut Lines<R>) -> Result<String, AppError>
where
    R: AsyncBufRead + Unpin,
{
    let line = lines
        .next_line()
        .await?
        .ok_or_else(|| AppError::Usage("passphrase expected on stdin".to_string()))?;
    Ok(line.trim_end().to_string())
}
