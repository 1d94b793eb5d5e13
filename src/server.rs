//! MatchServer Actor implementation
//!
//! The central actor that owns the engine and with it all matchmaking state.
//! Uses the Actor pattern with mpsc channels for message passing: one command
//! is processed at a time, so every transition is applied as a unit.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::error::ChatError;
use crate::message::{InboundMessage, MessageContent, ServerMessage};
use crate::profile::{Gender, UserProfile};
use crate::transport::{Transport, WsTransport};
use crate::types::{ConnectionId, MessageId, Ticket, UserId};

/// Commands sent from handlers (and the retry scheduler) to the MatchServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// Connection identified as a user
    Connect {
        user: UserId,
        connection: ConnectionId,
        sender: mpsc::Sender<ServerMessage>,
    },
    /// Connection closed
    Disconnect {
        user: UserId,
        connection: ConnectionId,
    },
    /// Store registration answers
    Register { user: UserId, profile: UserProfile },
    /// Start searching
    Start {
        user: UserId,
        filter: Option<Gender>,
    },
    /// Stop searching or end the session
    Stop { user: UserId },
    /// End the session and search again
    Next { user: UserId },
    /// Relay a new message
    Send {
        user: UserId,
        content: MessageContent,
        reply_to: Option<MessageId>,
    },
    /// Relay an edit
    Edit {
        user: UserId,
        message_id: MessageId,
        content: MessageContent,
    },
    /// Toggle loop-back debug mode
    Debug { user: UserId },
    /// Show the stored profile
    Profile { user: UserId },
    /// Command without logic yet
    Placeholder { user: UserId },
    /// Deferred match retry fired
    RetryMatch { user: UserId, ticket: Ticket },
}

/// The main MatchServer actor
pub struct MatchServer {
    engine: Engine,
    transport: Arc<WsTransport>,
    receiver: mpsc::Receiver<ServerCommand>,
}

impl MatchServer {
    /// Create a new MatchServer
    ///
    /// `transport` must be the same transport the engine delivers through.
    pub fn new(
        engine: Engine,
        transport: Arc<WsTransport>,
        receiver: mpsc::Receiver<ServerCommand>,
    ) -> Self {
        Self {
            engine,
            transport,
            receiver,
        }
    }

    /// Run the MatchServer event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("MatchServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!("MatchServer shutting down");
    }

    /// Process a single command
    async fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Connect {
                user,
                connection,
                sender,
            } => {
                info!("User {} connected on {}", user, connection);
                self.transport.connect(user, connection, sender).await;
            }
            ServerCommand::Disconnect { user, connection } => {
                self.handle_disconnect(user, connection).await;
            }
            ServerCommand::Register { user, profile } => {
                let result = self.engine.register(user, profile).await;
                self.report(user, result).await;
            }
            ServerCommand::Start { user, filter } => {
                let result = self.engine.start(user, filter).await;
                self.report(user, result).await;
            }
            ServerCommand::Stop { user } => {
                let result = self.engine.stop(user).await;
                self.report(user, result).await;
            }
            ServerCommand::Next { user } => {
                let result = self.engine.next(user).await;
                self.report(user, result).await;
            }
            ServerCommand::Send {
                user,
                content,
                reply_to,
            } => {
                self.handle_send(user, content, reply_to).await;
            }
            ServerCommand::Edit {
                user,
                message_id,
                content,
            } => {
                let message = InboundMessage {
                    id: message_id,
                    content,
                    reply_to: None,
                };
                let result = self.engine.relay_edit(user, message).await;
                self.report_delivery(user, result).await;
            }
            ServerCommand::Debug { user } => {
                self.engine.toggle_debug(user).await;
            }
            ServerCommand::Profile { user } => {
                let result = self.engine.show_profile(user).await;
                self.report(user, result).await;
            }
            ServerCommand::Placeholder { user } => {
                self.engine.under_construction(user).await;
            }
            ServerCommand::RetryMatch { user, ticket } => {
                self.engine.retry_match(user, ticket).await;
            }
        }
    }

    /// Handle connection loss
    async fn handle_disconnect(&mut self, user: UserId, connection: ConnectionId) {
        // A newer connection for the same user keeps the session alive
        if !self.transport.disconnect(user, connection).await {
            debug!("Stale disconnect of {} on {}", user, connection);
            return;
        }

        info!("User {} disconnected", user);
        self.engine.disconnect(user).await;
    }

    /// Handle a new message: assign its id, then relay it
    async fn handle_send(
        &mut self,
        user: UserId,
        content: MessageContent,
        reply_to: Option<MessageId>,
    ) {
        let id = match self.transport.accept(user).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Could not acknowledge message from {}: {}", user, e);
                return;
            }
        };

        let message = InboundMessage {
            id,
            content,
            reply_to,
        };
        let result = self.engine.relay(user, message).await;
        self.report_delivery(user, result).await;
    }

    /// Helper: send a refused request back to the user
    async fn report(&self, user: UserId, result: Result<(), ChatError>) {
        if let Err(err) = result {
            debug!("Request from {} refused: {}", user, err);
            if let Err(e) = self.transport.report(user, &err).await {
                debug!("Could not report refusal to {}: {}", user, e);
            }
        }
    }

    /// Helper: report a refused or undelivered relay
    async fn report_delivery(&self, user: UserId, result: Result<bool, ChatError>) {
        match result {
            Ok(true) => {}
            Ok(false) => self.report(user, Err(ChatError::TransportDeliveryFailed)).await,
            Err(err) => self.report(user, Err(err)).await,
        }
    }
}
