//! Transport seam
//!
//! The core reaches users only through the `Transport` trait. `WsTransport`
//! implements it over the per-connection channels of the WebSocket handler.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::client::Client;
use crate::error::{ChatError, TransportError};
use crate::message::{MessageContent, Notice, ServerMessage};
use crate::types::{ConnectionId, MessageId, UserId};

/// Outbound operations the core needs from a messaging platform
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a notification; returns its id in the user's chat
    async fn notify(&self, user: UserId, notice: Notice) -> Result<MessageId, TransportError>;

    /// Deliver message content, optionally as a reply
    async fn deliver(
        &self,
        user: UserId,
        content: &MessageContent,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId, TransportError>;

    /// Edit a delivered message in place
    ///
    /// `Ok(false)` means the platform cannot edit this content kind and the
    /// caller should delete and resend instead.
    async fn edit(
        &self,
        user: UserId,
        message_id: MessageId,
        content: &MessageContent,
    ) -> Result<bool, TransportError>;

    /// Remove a delivered message
    async fn delete(&self, user: UserId, message_id: MessageId) -> Result<(), TransportError>;

    /// Tell the user a request was refused
    async fn report(&self, user: UserId, error: &ChatError) -> Result<(), TransportError>;
}

/// Transport over live WebSocket connections
#[derive(Debug, Default)]
pub struct WsTransport {
    clients: Mutex<HashMap<UserId, Client>>,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection to a user, replacing any older connection
    pub async fn connect(
        &self,
        user: UserId,
        connection: ConnectionId,
        sender: mpsc::Sender<ServerMessage>,
    ) {
        let mut clients = self.clients.lock().await;
        match clients.get_mut(&user) {
            Some(client) => {
                debug!("User {} replaced connection {}", user, client.connection);
                client.reconnect(connection, sender);
            }
            None => {
                clients.insert(user, Client::new(user, connection, sender));
            }
        }
        debug!("Connected users: {}", clients.len());
    }

    /// Unbind a connection
    ///
    /// Returns false if the user has since moved to another connection,
    /// in which case nothing changes.
    pub async fn disconnect(&self, user: UserId, connection: ConnectionId) -> bool {
        let mut clients = self.clients.lock().await;
        match clients.get(&user) {
            Some(client) if client.connection == connection => {
                clients.remove(&user);
                true
            }
            _ => false,
        }
    }

    /// Assign an id to a message the user just sent and acknowledge it
    pub async fn accept(&self, user: UserId) -> Result<MessageId, TransportError> {
        self.push(user, |message_id| ServerMessage::Accepted { message_id })
            .await
    }

    #[cfg(test)]
    pub async fn is_connected(&self, user: UserId) -> bool {
        self.clients.lock().await.contains_key(&user)
    }

    /// Send a message that takes a new id in the user's chat
    async fn push<F>(&self, user: UserId, build: F) -> Result<MessageId, TransportError>
    where
        F: FnOnce(MessageId) -> ServerMessage + Send,
    {
        let mut clients = self.clients.lock().await;
        let client = clients
            .get_mut(&user)
            .ok_or(TransportError::Unreachable(user))?;

        let message_id = client.allocate_id();
        client.send(build(message_id))?;
        Ok(message_id)
    }

    /// Send a message that does not occupy an id
    async fn send(&self, user: UserId, msg: ServerMessage) -> Result<(), TransportError> {
        let clients = self.clients.lock().await;
        let client = clients
            .get(&user)
            .ok_or(TransportError::Unreachable(user))?;
        client.send(msg)
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn notify(&self, user: UserId, notice: Notice) -> Result<MessageId, TransportError> {
        self.push(user, |message_id| ServerMessage::Notice { message_id, notice })
            .await
    }

    async fn deliver(
        &self,
        user: UserId,
        content: &MessageContent,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId, TransportError> {
        let content = content.clone();
        self.push(user, |message_id| ServerMessage::Message {
            message_id,
            content,
            reply_to,
        })
        .await
    }

    async fn edit(
        &self,
        user: UserId,
        message_id: MessageId,
        content: &MessageContent,
    ) -> Result<bool, TransportError> {
        if !content.kind().is_editable() {
            return Ok(false);
        }

        self.send(
            user,
            ServerMessage::Edited {
                message_id,
                content: content.clone(),
            },
        )
        .await?;
        Ok(true)
    }

    async fn delete(&self, user: UserId, message_id: MessageId) -> Result<(), TransportError> {
        self.send(user, ServerMessage::Deleted { message_id }).await
    }

    async fn report(&self, user: UserId, error: &ChatError) -> Result<(), TransportError> {
        self.send(user, error.into()).await
    }
}
