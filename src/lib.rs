//! Anonymous 1:1 Pairing Relay Library
//!
//! Users register a small profile, ask for a partner (optionally of one
//! gender only) and are bridged into a two-way message relay until either
//! side stops or asks for someone new.
//!
//! # Features
//! - Registration of gender, country and age bracket
//! - First-fit matchmaking with mutual gender filters
//! - Deferred, cancellable match retries for waiting users
//! - Message relay of text and media with reply re-anchoring
//! - Edit propagation with delete-and-resend fallback
//! - Loop-back debug mode
//! - Disconnection handling
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `MatchServer` is the central actor; it owns the `Engine`, which owns
//!   the `SessionController` and with it all state
//! - The controller applies each transition synchronously and hands back
//!   the effects; the engine performs them through `Transport` and `Scheduler`
//! - Each connection has a `handler` task communicating with the server
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use pairchat::{
//!     handle_connection, Engine, MatchServer, MemoryProfiles, SessionController,
//!     TokioScheduler, WsTransport,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let (cmd_tx, cmd_rx) = mpsc::channel(256);
//!
//!     let transport = Arc::new(WsTransport::new());
//!     let engine = Engine::new(
//!         SessionController::new(),
//!         transport.clone(),
//!         Arc::new(TokioScheduler::new(&cmd_tx)),
//!         Arc::new(MemoryProfiles::new()),
//!     );
//!     tokio::spawn(MatchServer::new(engine, transport, cmd_rx).run());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         let cmd_tx = cmd_tx.clone();
//!         tokio::spawn(handle_connection(stream, cmd_tx, 32));
//!     }
//! }
//! ```

pub mod client;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod handler;
pub mod matcher;
pub mod message;
pub mod profile;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use crate::config::Settings;
pub use controller::{Effect, Presence, SessionController, Transition};
pub use engine::Engine;
pub use error::{AppError, ChatError, ProfileError, TransportError};
pub use handler::handle_connection;
pub use message::{
    ClientMessage, ErrorCode, InboundMessage, MessageContent, MessageKind, Notice, ServerMessage,
};
pub use profile::{
    AgeBracket, Country, Gender, JsonlProfiles, MemoryProfiles, ProfileSource, UserProfile,
};
pub use scheduler::{Scheduler, TokioScheduler};
pub use server::{MatchServer, ServerCommand};
pub use transport::{Transport, WsTransport};
pub use types::{ConnectionId, MessageId, Ticket, UserId};
