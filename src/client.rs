//! Client struct definition
//!
//! Represents a connected user with their communication channel and the
//! message-id counter of their chat.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::TransportError;
use crate::message::ServerMessage;
use crate::types::{ConnectionId, MessageId, UserId};

/// Connected user information
///
/// Every message that appears in the user's chat, their own or one
/// delivered to them, takes its id from `last_message_id`.
#[derive(Debug)]
pub struct Client {
    /// Platform identity
    pub user: UserId,
    /// Current connection for this identity
    pub connection: ConnectionId,
    /// Server → Client message channel
    sender: mpsc::Sender<ServerMessage>,
    last_message_id: i64,
}

impl Client {
    /// Create a new client with the given identity and sender channel
    pub fn new(user: UserId, connection: ConnectionId, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            user,
            connection,
            sender,
            last_message_id: 0,
        }
    }

    /// Move to a new connection, keeping the chat's id sequence
    pub fn reconnect(&mut self, connection: ConnectionId, sender: mpsc::Sender<ServerMessage>) {
        self.connection = connection;
        self.sender = sender;
    }

    /// Next message id in this user's chat
    pub fn allocate_id(&mut self) -> MessageId {
        self.last_message_id += 1;
        MessageId(self.last_message_id)
    }

    /// Queue a message for this client without waiting
    ///
    /// A client that stops reading fills its queue and gets `QueueFull`
    /// instead of stalling the caller. A closed channel means the client
    /// disconnected.
    pub fn send(&self, msg: ServerMessage) -> Result<(), TransportError> {
        self.sender.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::QueueFull(self.user),
            TrySendError::Closed(_) => TransportError::ChannelClosed,
        })
    }
}
