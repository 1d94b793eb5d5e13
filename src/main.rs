//! Anonymous Pairing Relay - Entry Point
//!
//! Loads configuration and profiles, starts the MatchServer actor and
//! accepts WebSocket connections.

use std::env;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pairchat::{
    handle_connection, Engine, JsonlProfiles, MatchServer, ProfileSource, SessionController,
    Settings, TokioScheduler, WsTransport,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load()?;

    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=pairchat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level)),
        )
        .init();

    // Bind address from command line overrides the configured one
    let addr = env::args()
        .nth(1)
        .unwrap_or_else(|| settings.server.addr.clone());

    let profiles = Arc::new(JsonlProfiles::open(&settings.profiles.path).await?);
    let controller = SessionController::with_profiles(profiles.load_all().await?);

    // Start TCP listener
    let listener = TcpListener::bind(&addr).await?;
    info!("Pairing relay listening on {}", addr);

    // Create MatchServer actor channel and start
    let (cmd_tx, cmd_rx) = mpsc::channel(settings.server.channel_buffer);
    let transport = Arc::new(WsTransport::new());
    let scheduler = Arc::new(TokioScheduler::new(&cmd_tx));
    let engine = Engine::new(controller, transport.clone(), scheduler, profiles)
        .with_retry_interval(settings.matching.retry_interval());
    tokio::spawn(MatchServer::new(engine, transport, cmd_rx).run());

    info!("MatchServer actor started");

    let client_buffer = settings.server.client_buffer;

    // Connection accept loop
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let cmd_tx = cmd_tx.clone();

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, cmd_tx, client_buffer).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
