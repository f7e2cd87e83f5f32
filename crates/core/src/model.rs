// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Conversation data model.
//!
//! These are the records shared between the record API, the push stream and
//! the in-memory store: Conversation, Participant, Message and the
//! denormalized MessageSummary used for list rendering. JSON field names are
//! camelCase to match the record API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Opaque conversation identifier.
pub type ConversationId = String;
/// Opaque message identifier.
pub type MessageId = String;
/// Opaque user identifier.
pub type UserId = String;

/// Availability of a participant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    #[default]
    Offline,
    Away,
    Busy,
}

impl PresenceStatus {
    /// Returns the string representation used on the wire and in display.
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Offline => "offline",
            PresenceStatus::Away => "away",
            PresenceStatus::Busy => "busy",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PresenceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "online" => Ok(PresenceStatus::Online),
            "offline" => Ok(PresenceStatus::Offline),
            "away" => Ok(PresenceStatus::Away),
            "busy" => Ok(PresenceStatus::Busy),
            _ => Err(Error::InvalidPresence(s.to_string())),
        }
    }
}

/// Deserializes a presence status, treating unknown values as offline.
pub(crate) fn lenient_status<'de, D>(deserializer: D) -> std::result::Result<PresenceStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw.parse().unwrap_or_default())
}

/// Kind of message payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Text,
    Image,
    File,
    System,
}

impl ContentType {
    /// Returns the string representation used on the wire and in display.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Image => "image",
            ContentType::File => "file",
            ContentType::System => "system",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(ContentType::Text),
            "image" => Ok(ContentType::Image),
            "file" => Ok(ContentType::File),
            "system" => Ok(ContentType::System),
            _ => Err(Error::InvalidContentType(s.to_string())),
        }
    }
}

/// Client-side delivery state of a transcript entry.
///
/// Never sent by the server; entries from the record API or the push stream
/// are always `Confirmed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    #[default]
    Confirmed,
    /// Appended locally, waiting for the send response.
    Pending,
    /// The send request failed.
    Failed,
}

impl Delivery {
    pub fn is_confirmed(&self) -> bool {
        *self == Delivery::Confirmed
    }
}

/// Presence block of a participant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    #[serde(deserialize_with = "lenient_status")]
    pub status: PresenceStatus,
}

/// A user's membership record within a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: UserId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub last_read_message_id: Option<MessageId>,
    #[serde(default)]
    pub last_read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub presence: Presence,
}

impl Participant {
    /// Creates an offline participant with no read state.
    pub fn new(user_id: impl Into<UserId>, name: impl Into<String>) -> Self {
        Participant {
            user_id: user_id.into(),
            name: name.into(),
            last_read_message_id: None,
            last_read_at: None,
            presence: Presence::default(),
        }
    }
}

/// A single transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(alias = "_id")]
    pub id: MessageId,
    #[serde(default)]
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    #[serde(default)]
    pub sender_name: String,
    pub content: String,
    #[serde(default)]
    pub content_type: ContentType,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Delivery::is_confirmed")]
    pub delivery: Delivery,
}

impl Message {
    /// Creates an optimistic text message that has not reached the server yet.
    pub fn pending(
        local_id: impl Into<MessageId>,
        conversation_id: impl Into<ConversationId>,
        sender_id: impl Into<UserId>,
        sender_name: impl Into<String>,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Message {
            id: local_id.into(),
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
            content: content.into(),
            content_type: ContentType::Text,
            created_at,
            delivery: Delivery::Pending,
        }
    }

    /// Returns true for entries that only exist locally.
    pub fn is_local(&self) -> bool {
        !self.delivery.is_confirmed()
    }
}

/// Denormalized summary of the latest message, for list rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    #[serde(alias = "_id")]
    pub id: MessageId,
    pub content: String,
    #[serde(default)]
    pub content_type: ContentType,
    pub created_at: DateTime<Utc>,
    pub sender_id: UserId,
    #[serde(default)]
    pub sender_name: String,
}

impl From<&Message> for MessageSummary {
    fn from(message: &Message) -> Self {
        MessageSummary {
            id: message.id.clone(),
            content: message.content.clone(),
            content_type: message.content_type,
            created_at: message.created_at,
            sender_id: message.sender_id.clone(),
            sender_name: message.sender_name.clone(),
        }
    }
}

/// A direct or group conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(alias = "_id")]
    pub id: ConversationId,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub last_message: Option<MessageSummary>,
    #[serde(default)]
    pub unread_count: u32,
}

impl Conversation {
    /// Creates an empty direct conversation.
    pub fn new(id: impl Into<ConversationId>) -> Self {
        Conversation {
            id: id.into(),
            display_name: None,
            is_group: false,
            participants: Vec::new(),
            last_message: None,
            unread_count: 0,
        }
    }

    /// Sets the participants (builder style).
    pub fn with_participants(mut self, participants: Vec<Participant>) -> Self {
        self.participants = participants;
        self.normalize();
        self
    }

    /// Name to show for this conversation.
    ///
    /// Direct conversations without a name are titled after the first
    /// participant who is not the local user.
    pub fn title(&self, local_user: &str) -> &str {
        if let Some(name) = self.display_name.as_deref().filter(|n| !n.is_empty()) {
            return name;
        }
        if !self.is_group {
            if let Some(other) = self.participants.iter().find(|p| p.user_id != local_user) {
                return &other.name;
            }
        }
        "Unknown"
    }

    /// Finds a participant by user ID.
    pub fn participant_mut(&mut self, user_id: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.user_id == user_id)
    }

    /// Returns true if the user is a member of this conversation.
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p.user_id == user_id)
    }

    /// Timestamp of the latest known activity, if any.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_message.as_ref().map(|m| m.created_at)
    }

    /// Drops duplicate participants, keeping the first entry per user ID.
    pub fn normalize(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.participants.retain(|p| seen.insert(p.user_id.clone()));
    }
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
