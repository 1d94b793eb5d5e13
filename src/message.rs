//! Message protocol definitions
//!
//! JSON-based bidirectional message protocol using Serde's tagged enum
//! for type-safe serialization/deserialization, plus the content model
//! the relay forwards between partners.

use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::profile::{AgeBracket, Country, Gender, UserProfile};
use crate::types::{MessageId, UserId};

/// Content of a chat message
///
/// Media is referenced by an opaque platform file id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: String },
    Photo { file_id: String, caption: Option<String> },
    Video { file_id: String, caption: Option<String> },
    Animation { file_id: String, caption: Option<String> },
    Document { file_id: String, caption: Option<String> },
    Audio { file_id: String, caption: Option<String> },
    Voice { file_id: String },
    VideoNote { file_id: String },
    Sticker { file_id: String, emoji: Option<String> },
}

/// Content kind without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Photo,
    Video,
    Animation,
    Document,
    Audio,
    Voice,
    VideoNote,
    Sticker,
}

impl MessageContent {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageContent::Text { .. } => MessageKind::Text,
            MessageContent::Photo { .. } => MessageKind::Photo,
            MessageContent::Video { .. } => MessageKind::Video,
            MessageContent::Animation { .. } => MessageKind::Animation,
            MessageContent::Document { .. } => MessageKind::Document,
            MessageContent::Audio { .. } => MessageKind::Audio,
            MessageContent::Voice { .. } => MessageKind::Voice,
            MessageContent::VideoNote { .. } => MessageKind::VideoNote,
            MessageContent::Sticker { .. } => MessageKind::Sticker,
        }
    }
}

impl MessageKind {
    /// Whether an already-delivered message of this kind can be edited in place
    ///
    /// Text and captions can; voice, video notes and stickers cannot.
    pub fn is_editable(self) -> bool {
        !self.is_voice_or_sticker()
    }

    /// Voice/sticker-class media, announced with a marker in debug mode
    pub fn is_voice_or_sticker(self) -> bool {
        matches!(
            self,
            MessageKind::Voice | MessageKind::VideoNote | MessageKind::Sticker
        )
    }
}

/// A message received from a user, as handed to the relay
///
/// `id` is the message's identifier in the sender's own chat. For an
/// edit, `id` names the original message and `content` is the new content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: MessageId,
    pub content: MessageContent,
    pub reply_to: Option<MessageId>,
}

/// Notifications the core sends to users
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// Profile stored
    Registered,
    /// Now waiting for a partner
    Searching,
    /// Paired with a partner
    PartnerFound,
    /// Search cancelled by the user
    SearchStopped,
    /// Session ended by the user
    SessionEnded,
    /// Session ended by the partner (stop, next or disconnect)
    PartnerLeft,
    /// Loop-back debug mode switched on
    DebugEnabled,
    /// Loop-back debug mode switched off
    DebugDisabled,
    /// Informational marker preceding voice/sticker-class media in debug mode
    DebugMarker { media: MessageKind },
    /// An earlier state-change notice could not be delivered
    DeliveryWarning,
    /// Placeholder command with no logic yet
    UnderConstruction,
    /// The user's stored profile
    Profile { profile: UserProfile },
}

impl Notice {
    /// Notices whose loss leaves the user unaware of a state change
    pub fn is_state_change(&self) -> bool {
        matches!(self, Notice::PartnerFound | Notice::PartnerLeft)
    }
}

/// Client → Server message
///
/// All messages from client to server. Uses tagged enum with snake_case naming.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind the connection to a platform identity (must come first)
    Identify { user_id: UserId },
    /// Store the registration answers
    Register {
        gender: Gender,
        country: Country,
        age: AgeBracket,
    },
    /// Start searching, optionally for one gender only
    Start {
        #[serde(default)]
        filter: Option<Gender>,
    },
    /// Stop the search or end the session
    Stop,
    /// End the session and search again
    Next,
    /// Send a message to the partner
    Send {
        content: MessageContent,
        #[serde(default)]
        reply_to: Option<MessageId>,
    },
    /// Edit an earlier message
    Edit {
        message_id: MessageId,
        content: MessageContent,
    },
    /// Toggle loop-back debug mode
    Debug,
    /// Show the stored profile
    Profile,
    Vip,
    Rooms,
    Top,
    Link,
    Ref,
    Issue,
}

/// Server → Client message
///
/// All messages from server to client. Uses tagged enum with snake_case naming.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection bound to the identity
    Identified { user_id: UserId },
    /// Id assigned to the client's own message
    Accepted { message_id: MessageId },
    /// Message relayed from the partner
    Message {
        message_id: MessageId,
        content: MessageContent,
        reply_to: Option<MessageId>,
    },
    /// An earlier relayed message changed
    Edited {
        message_id: MessageId,
        content: MessageContent,
    },
    /// An earlier relayed message was removed
    Deleted { message_id: MessageId },
    /// Notification from the server
    Notice { message_id: MessageId, notice: Notice },
    /// Error occurred
    Error { code: ErrorCode, message: String },
}

/// Error codes for ServerMessage::Error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotRegistered,
    NotInSession,
    AlreadySearching,
    AlreadyPaired,
    NothingToStop,
    DebugActive,
    NotAuthor,
    Busy,
    DeliveryFailed,
    /// Invalid message format
    InvalidMessage,
}

/// Convert ChatError to ServerMessage for client notification
impl From<&ChatError> for ServerMessage {
    fn from(err: &ChatError) -> Self {
        let (code, message) = match err {
            ChatError::NotRegistered => (
                ErrorCode::NotRegistered,
                "You are not registered, send register first",
            ),
            ChatError::NotInSession => (
                ErrorCode::NotInSession,
                "You are not in a dialog, use start to find a partner",
            ),
            ChatError::AlreadySearching => (
                ErrorCode::AlreadySearching,
                "You are already searching, use stop to cancel",
            ),
            ChatError::AlreadyPaired => (
                ErrorCode::AlreadyPaired,
                "You are already in a dialog, use stop to end it",
            ),
            ChatError::NothingToStop => (
                ErrorCode::NothingToStop,
                "You are neither searching nor in a dialog",
            ),
            ChatError::DebugActive => (
                ErrorCode::DebugActive,
                "Debug mode is on, use debug or stop to leave it",
            ),
            ChatError::NotAuthor => (
                ErrorCode::NotAuthor,
                "Only your own messages can be edited",
            ),
            ChatError::Busy => (
                ErrorCode::Busy,
                "Finish the current search or dialog first",
            ),
            ChatError::TransportDeliveryFailed => (
                ErrorCode::DeliveryFailed,
                "Your message could not be delivered",
            ),
        };
        ServerMessage::Error {
            code,
            message: message.to_string(),
        }
    }
}

impl From<ChatError> for ServerMessage {
    fn from(err: ChatError) -> Self {
        Self::from(&err)
    }
}
