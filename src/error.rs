//! Error types for the pairing relay
//!
//! Defines connection-level errors, the recoverable session errors users
//! can trigger, transport delivery errors and profile persistence errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::types::UserId;

/// Application-level errors
///
/// Fatal for the connection or process that hits them.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    /// Profile store could not be opened
    #[error("Profile store error: {0}")]
    Profile(#[from] ProfileError),

    /// Connection closed before sending `identify`
    #[error("Connection closed before identifying")]
    NotIdentified,
}

/// Session errors
///
/// All recoverable: the user is told and state is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// No profile exists for the user
    #[error("Not registered")]
    NotRegistered,

    /// Relay requested while not paired
    #[error("Not in session")]
    NotInSession,

    /// `start` while already waiting for a partner
    #[error("Already searching")]
    AlreadySearching,

    /// `start` while already paired
    #[error("Already paired")]
    AlreadyPaired,

    /// `stop`/`next` with nothing to stop
    #[error("Nothing to stop")]
    NothingToStop,

    /// `start` while in debug loop-back mode
    #[error("Debug mode active")]
    DebugActive,

    /// Edit of a message the user received rather than wrote
    #[error("Not the author")]
    NotAuthor,

    /// Profile change requested while searching or paired
    #[error("Busy")]
    Busy,

    /// A relay could not be delivered to the partner
    #[error("Transport delivery failed")]
    TransportDeliveryFailed,
}

/// Transport delivery errors
///
/// Caught at the relay boundary and turned into a `false` success flag.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The user has no live connection
    #[error("User {0} is unreachable")]
    Unreachable(UserId),

    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The user's outbound queue is full; they are not reading
    #[error("Outbound queue of user {0} is full")]
    QueueFull(UserId),
}

/// Profile persistence errors
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
