// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Record API client.
//!
//! Request/response access to the authoritative conversation records.
//! Failures are classified into [`ApiError`] so the fetch layer can decide
//! whether to retry:
//! - missing token, HTTP 401/403: `Auth`
//! - connect, timeout and other transport failures: `Network`
//! - any other non-2xx status, bodies that are not JSON or lack the
//!   expected key: `Format`

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use cs_core::{ContentType, Conversation, ConversationId, Message, UserId};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ErrorKind, Result};

/// Classified record API failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),

    #[error("not authorized: {0}\n  hint: check the token or log in again")]
    Auth(String),

    #[error("unexpected response: {0}")]
    Format(String),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Network(_) => ErrorKind::Network,
            ApiError::Auth(_) => ErrorKind::Auth,
            ApiError::Format(_) => ErrorKind::Format,
        }
    }
}

/// Result type for record API calls.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Boxed future returned by [`RecordApi`] methods.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = ApiResult<T>> + Send + 'a>>;

/// Request body for creating a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConversation {
    pub participant_ids: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub is_group: bool,
}

impl NewConversation {
    /// A direct conversation with one other user.
    pub fn direct(user_id: impl Into<UserId>) -> Self {
        NewConversation {
            participant_ids: vec![user_id.into()],
            name: None,
            is_group: false,
        }
    }

    /// A named group conversation.
    pub fn group(name: impl Into<String>, participant_ids: Vec<UserId>) -> Self {
        NewConversation {
            participant_ids,
            name: Some(name.into()),
            is_group: true,
        }
    }
}

/// Authoritative record access.
pub trait RecordApi: Send + Sync {
    /// Fetches the user's conversations.
    fn list_conversations(&self) -> ApiFuture<'_, Vec<Conversation>>;

    /// Fetches one conversation's history, oldest first.
    fn list_messages(&self, conversation_id: &str) -> ApiFuture<'_, Vec<Message>>;

    /// Posts a message; returns the server-confirmed record.
    fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        content_type: ContentType,
    ) -> ApiFuture<'_, Message>;

    /// Creates a conversation; returns the stored record.
    fn create_conversation(&self, new: &NewConversation) -> ApiFuture<'_, Conversation>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendBody {
    content: String,
    content_type: ContentType,
}

/// reqwest-backed [`RecordApi`].
pub struct HttpRecordApi {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpRecordApi {
    /// Creates a client for `base_url` (no trailing slash needed).
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(HttpRecordApi {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn token(&self) -> ApiResult<&str> {
        self.token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Auth("no credential".into()))
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> ApiResult<String> {
        let token = self.token()?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        check_status(status, &body)?;
        Ok(body)
    }
}

/// Maps a non-success status to its error class.
pub(crate) fn check_status(status: StatusCode, body: &str) -> ApiResult<()> {
    if status.is_success() {
        return Ok(());
    }
    debug!("record api returned {}: {}", status, body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ApiError::Auth(status.to_string())),
        _ => Err(ApiError::Format(format!("status {}", status))),
    }
}

/// Decodes `{ "<key>": T }`.
pub(crate) fn decode_field<T: DeserializeOwned>(body: &str, key: &str) -> ApiResult<T> {
    let mut value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| ApiError::Format(e.to_string()))?;
    let field = value
        .get_mut(key)
        .map(serde_json::Value::take)
        .ok_or_else(|| ApiError::Format(format!("missing '{}'", key)))?;
    serde_json::from_value(field).map_err(|e| ApiError::Format(e.to_string()))
}

/// Decodes a record that may arrive bare or wrapped as `{ "<key>": T }`.
pub(crate) fn decode_record<T: DeserializeOwned>(body: &str, key: &str) -> ApiResult<T> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| ApiError::Format(e.to_string()))?;
    let record = match value.get(key) {
        Some(inner) if inner.is_object() => inner.clone(),
        _ => value,
    };
    serde_json::from_value(record).map_err(|e| ApiError::Format(e.to_string()))
}

fn stamp(mut message: Message, conversation_id: &str) -> Message {
    if message.conversation_id.is_empty() {
        message.conversation_id = conversation_id.to_string();
    }
    message
}

impl RecordApi for HttpRecordApi {
    fn list_conversations(&self) -> ApiFuture<'_, Vec<Conversation>> {
        Box::pin(async move {
            let request = self.client.get(self.url("/conversations"));
            let body = self.execute(request).await?;
            decode_field(&body, "conversations")
        })
    }

    fn list_messages(&self, conversation_id: &str) -> ApiFuture<'_, Vec<Message>> {
        let conversation_id: ConversationId = conversation_id.to_string();
        Box::pin(async move {
            let path = format!("/conversations/{}/messages", conversation_id);
            let body = self.execute(self.client.get(self.url(&path))).await?;
            let messages: Vec<Message> = decode_field(&body, "messages")?;
            Ok(messages
                .into_iter()
                .map(|m| stamp(m, &conversation_id))
                .collect())
        })
    }

    fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        content_type: ContentType,
    ) -> ApiFuture<'_, Message> {
        let conversation_id = conversation_id.to_string();
        let body = SendBody {
            content: content.to_string(),
            content_type,
        };
        Box::pin(async move {
            let path = format!("/conversations/{}/messages", conversation_id);
            let request = self.client.post(self.url(&path)).json(&body);
            let response = self.execute(request).await?;
            let message: Message = decode_record(&response, "message")?;
            Ok(stamp(message, &conversation_id))
        })
    }

    fn create_conversation(&self, new: &NewConversation) -> ApiFuture<'_, Conversation> {
        let new = new.clone();
        Box::pin(async move {
            let request = self.client.post(self.url("/conversations")).json(&new);
            let response = self.execute(request).await?;
            decode_record(&response, "conversation")
        })
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
