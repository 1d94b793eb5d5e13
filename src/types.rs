//! Basic type definitions for the pairing relay
//!
//! Provides newtype wrappers for type safety:
//! - `UserId`: platform-assigned numeric user identity
//! - `MessageId`: identifier of a message inside one user's chat
//! - `ConnectionId`: UUID-based identifier of one WebSocket connection
//! - `Ticket`: sequence number of one search entry

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Platform-assigned user identity (newtype pattern)
///
/// Stable across connections. Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a message as it appears in one user's chat
///
/// Only unique within a single chat; the same number in two chats names
/// two unrelated messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Unique connection identifier
///
/// A user may reconnect; the connection id tells an old socket's
/// disconnect apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sequence number of a search entry
///
/// Monotonically increasing per registry. Doubles as the insertion-order key
/// and as the token a deferred retry must present to still be valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(pub u64);

impl std::fmt::Display for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
