//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake, identity
//! binding, message parsing, and bidirectional communication with the
//! MatchServer.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::message::{ClientMessage, ErrorCode, ServerMessage};
use crate::profile::UserProfile;
use crate::server::ServerCommand;
use crate::types::{ConnectionId, UserId};

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, waits for `identify`, then relays
/// commands to the MatchServer and its replies back until either side closes.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
    client_buffer: usize,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let connection = ConnectionId::new();

    // The first text frame must bind the connection to a user
    let user = loop {
        match ws_receiver.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Identify { user_id }) => break user_id,
                Ok(_) => {
                    let json = serde_json::to_string(&invalid("identify first"))?;
                    ws_sender.send(Message::Text(json.into())).await?;
                }
                Err(e) => {
                    warn!("Invalid JSON from {} before identify: {}", peer_addr, e);
                    let json = serde_json::to_string(&invalid(&e.to_string()))?;
                    ws_sender.send(Message::Text(json.into())).await?;
                }
            },
            Some(Ok(Message::Close(_))) | None => return Err(AppError::NotIdentified),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
    };

    info!("User {} connected from {} ({})", user, peer_addr, connection);

    // Create channel for server -> client messages
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(client_buffer);

    // Register with MatchServer
    if cmd_tx
        .send(ServerCommand::Connect {
            user,
            connection,
            sender: msg_tx,
        })
        .await
        .is_err()
    {
        error!("Failed to register user {} - server closed", user);
        return Err(AppError::ChannelSend);
    }

    // Send identification success message
    let json = serde_json::to_string(&ServerMessage::Identified { user_id: user })?;
    ws_sender.send(Message::Text(json.into())).await?;

    // Clone cmd_tx for read task
    let cmd_tx_read = cmd_tx.clone();

    // Spawn read task (WebSocket -> ServerCommand)
    let read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Identify { .. }) => {
                        warn!("User {} sent identify twice, ignoring", user);
                    }
                    Ok(client_msg) => {
                        let Some(cmd) = client_message_to_command(user, client_msg) else {
                            continue;
                        };
                        if cmd_tx_read.send(cmd).await.is_err() {
                            debug!("Server closed, ending read task for {}", user);
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Invalid JSON from {}: {}", user, e);
                    }
                },
                Ok(Message::Close(_)) => {
                    debug!("User {} sent close frame", user);
                    break;
                }
                Ok(Message::Ping(_)) => {
                    // Pong is handled automatically by tungstenite
                    debug!("Ping from {}", user);
                }
                Ok(_) => {
                    // Binary or other message types - ignore
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", user, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", user);
    });

    // Spawn write task (ServerMessage -> WebSocket)
    let write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                }
            }
        }
        debug!("Write task ended for {}", user);

        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete
    tokio::select! {
        _ = read_task => {
            debug!("Read task completed for {}", user);
        }
        _ = write_task => {
            debug!("Write task completed for {}", user);
        }
    }

    let _ = cmd_tx
        .send(ServerCommand::Disconnect { user, connection })
        .await;

    info!("User {} disconnected ({})", user, connection);

    Ok(())
}

fn invalid(message: &str) -> ServerMessage {
    ServerMessage::Error {
        code: ErrorCode::InvalidMessage,
        message: message.to_string(),
    }
}

/// Convert a ClientMessage to a ServerCommand
///
/// `Identify` is handled by the connection itself and yields `None`.
fn client_message_to_command(user: UserId, msg: ClientMessage) -> Option<ServerCommand> {
    let cmd = match msg {
        ClientMessage::Identify { .. } => return None,
        ClientMessage::Register {
            gender,
            country,
            age,
        } => ServerCommand::Register {
            user,
            profile: UserProfile {
                gender,
                country,
                age,
            },
        },
        ClientMessage::Start { filter } => ServerCommand::Start { user, filter },
        ClientMessage::Stop => ServerCommand::Stop { user },
        ClientMessage::Next => ServerCommand::Next { user },
        ClientMessage::Send { content, reply_to } => ServerCommand::Send {
            user,
            content,
            reply_to,
        },
        ClientMessage::Edit {
            message_id,
            content,
        } => ServerCommand::Edit {
            user,
            message_id,
            content,
        },
        ClientMessage::Debug => ServerCommand::Debug { user },
        ClientMessage::Profile => ServerCommand::Profile { user },
        ClientMessage::Vip
        | ClientMessage::Rooms
        | ClientMessage::Top
        | ClientMessage::Link
        | ClientMessage::Ref
        | ClientMessage::Issue => ServerCommand::Placeholder { user },
    };
    Some(cmd)
}
