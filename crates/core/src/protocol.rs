// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Push-stream protocol messages.
//!
//! Every frame is a named event with a JSON payload:
//! `{"event": "message:new", "data": {...}}`.
//! - Server pushes new messages, read receipts, presence changes and errors
//! - Client sends room join intents (fire-and-forget)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{lenient_status, ConversationId, Message, MessageId, PresenceStatus, UserId};

/// Events pushed from the server to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum PushEvent {
    /// A message was persisted in a conversation.
    #[serde(rename = "message:new")]
    MessageNew { message: Message },

    /// A participant's read receipt moved.
    #[serde(rename = "conversation:update", rename_all = "camelCase")]
    ConversationUpdate {
        conversation_id: ConversationId,
        user_id: UserId,
        #[serde(default)]
        last_read_message_id: Option<MessageId>,
        #[serde(default)]
        last_read_at: Option<DateTime<Utc>>,
    },

    /// A user's presence changed; applies to every conversation they are in.
    #[serde(rename = "presence:update", rename_all = "camelCase")]
    PresenceUpdate {
        user_id: UserId,
        #[serde(deserialize_with = "lenient_status")]
        status: PresenceStatus,
    },

    /// Server-reported connection error.
    #[serde(rename = "error")]
    Error {
        /// Human-readable error description.
        #[serde(alias = "message")]
        reason: String,
    },
}

/// Intents sent from the client to the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum ClientIntent {
    /// Ask for live updates for a conversation.
    #[serde(rename = "join:conversation", rename_all = "camelCase")]
    JoinConversation { conversation_id: ConversationId },
}

impl PushEvent {
    /// Creates a MessageNew event.
    pub fn message_new(message: Message) -> Self {
        PushEvent::MessageNew { message }
    }

    /// Creates a ConversationUpdate event.
    pub fn conversation_update(
        conversation_id: impl Into<ConversationId>,
        user_id: impl Into<UserId>,
        last_read_message_id: Option<MessageId>,
        last_read_at: Option<DateTime<Utc>>,
    ) -> Self {
        PushEvent::ConversationUpdate {
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            last_read_message_id,
            last_read_at,
        }
    }

    /// Creates a PresenceUpdate event.
    pub fn presence_update(user_id: impl Into<UserId>, status: PresenceStatus) -> Self {
        PushEvent::PresenceUpdate {
            user_id: user_id.into(),
            status,
        }
    }

    /// Creates an Error event.
    pub fn error(reason: impl Into<String>) -> Self {
        PushEvent::Error {
            reason: reason.into(),
        }
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            PushEvent::MessageNew { .. } => "message:new",
            PushEvent::ConversationUpdate { .. } => "conversation:update",
            PushEvent::PresenceUpdate { .. } => "presence:update",
            PushEvent::Error { .. } => "error",
        }
    }

    /// Serializes the event to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the event from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ClientIntent {
    /// Creates a JoinConversation intent.
    pub fn join(conversation_id: impl Into<ConversationId>) -> Self {
        ClientIntent::JoinConversation {
            conversation_id: conversation_id.into(),
        }
    }

    /// Event name on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            ClientIntent::JoinConversation { .. } => "join:conversation",
        }
    }

    /// Serializes the intent to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the intent from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
