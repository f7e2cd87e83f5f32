// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test doubles for the push channel and the record API.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use cs_core::protocol::{ClientIntent, PushEvent};
use cs_core::{ContentType, Conversation, Delivery, Message, MessageSummary, Participant};
use tokio::sync::Notify;

use crate::api::{ApiError, ApiFuture, ApiResult, NewConversation, RecordApi};
use crate::transport::{Transport, TransportError, TransportFuture};

pub const ME: &str = "u-1";

pub fn at(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap() + ChronoDuration::minutes(minute)
}

pub fn message(id: &str, conversation_id: &str, sender_id: &str, minute: i64) -> Message {
    Message {
        id: id.into(),
        conversation_id: conversation_id.into(),
        sender_id: sender_id.into(),
        sender_name: sender_id.to_uppercase(),
        content: format!("content of {}", id),
        content_type: ContentType::Text,
        created_at: at(minute),
        delivery: Delivery::Confirmed,
    }
}

pub fn conversation(id: &str, other: &str, last_minute: Option<i64>) -> Conversation {
    let mut conv = Conversation::new(id).with_participants(vec![
        Participant::new(ME, "Me"),
        Participant::new(other, other.to_uppercase()),
    ]);
    conv.last_message = last_minute.map(|m| MessageSummary::from(&message("seed", id, other, m)));
    conv
}

/// What the mock server pushes next.
#[derive(Debug, Clone)]
pub enum Incoming {
    Event(PushEvent),
    /// Server closes the connection.
    Close,
}

#[derive(Default)]
struct RemoteInner {
    incoming: Mutex<VecDeque<Incoming>>,
    notify: Notify,
    sent: Mutex<Vec<ClientIntent>>,
    tokens: Mutex<Vec<String>>,
    connects: AtomicUsize,
    fail_connects: AtomicUsize,
    hang_connects: AtomicBool,
    fail_sends: AtomicBool,
}

/// Server side of a mock push channel; hands out [`MockTransport`]s.
#[derive(Clone, Default)]
pub struct MockRemote {
    inner: Arc<RemoteInner>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(&self) -> MockTransport {
        MockTransport {
            remote: self.clone(),
            connected: false,
        }
    }

    pub fn push(&self, event: PushEvent) {
        self.queue(Incoming::Event(event));
    }

    pub fn close(&self) {
        self.queue(Incoming::Close);
    }

    fn queue(&self, incoming: Incoming) {
        self.inner.incoming.lock().unwrap().push_back(incoming);
        self.inner.notify.notify_one();
    }

    /// Make the next `n` connects fail.
    pub fn fail_next_connects(&self, n: usize) {
        self.inner.fail_connects.store(n, Ordering::SeqCst);
    }

    /// Make connects never finish.
    pub fn hang_connects(&self, hang: bool) {
        self.inner.hang_connects.store(hang, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.inner.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<ClientIntent> {
        self.inner.sent.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn tokens(&self) -> Vec<String> {
        self.inner.tokens.lock().unwrap().clone()
    }
}

/// Mock transport for testing without real sockets.
pub struct MockTransport {
    remote: MockRemote,
    connected: bool,
}

impl Transport for MockTransport {
    fn connect(&mut self, _url: &str, token: &str) -> TransportFuture<'_, ()> {
        let token = token.to_string();
        Box::pin(async move {
            let inner = &self.remote.inner;
            inner.connects.fetch_add(1, Ordering::SeqCst);
            inner.tokens.lock().unwrap().push(token);
            if inner.hang_connects.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            let failing = inner
                .fail_connects
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(TransportError::ConnectionFailed("mock failure".into()));
            }
            self.connected = true;
            Ok(())
        })
    }

    fn disconnect(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            self.connected = false;
            Ok(())
        })
    }

    fn send(&mut self, intent: ClientIntent) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            if !self.connected {
                return Err(TransportError::ConnectionClosed);
            }
            if self.remote.inner.fail_sends.load(Ordering::SeqCst) {
                self.connected = false;
                return Err(TransportError::SendFailed("mock failure".into()));
            }
            self.remote.inner.sent.lock().unwrap().push(intent);
            Ok(())
        })
    }

    fn recv(&mut self) -> TransportFuture<'_, Option<PushEvent>> {
        Box::pin(async move {
            if !self.connected {
                return Err(TransportError::ConnectionClosed);
            }
            let inner = Arc::clone(&self.remote.inner);
            loop {
                let next = inner.incoming.lock().unwrap().pop_front();
                match next {
                    Some(Incoming::Event(event)) => return Ok(Some(event)),
                    Some(Incoming::Close) => {
                        self.connected = false;
                        return Ok(None);
                    }
                    None => inner.notify.notified().await,
                }
            }
        })
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[derive(Default)]
struct ApiState {
    list_results: VecDeque<ApiResult<Vec<Conversation>>>,
    list: Vec<Conversation>,
    messages: HashMap<String, Vec<Message>>,
    message_results: VecDeque<ApiResult<Vec<Message>>>,
    send_results: VecDeque<ApiResult<Message>>,
    create_results: VecDeque<ApiResult<Conversation>>,
    sent: Vec<(String, String)>,
}

/// Scripted [`RecordApi`].
///
/// Scripted results are consumed first; afterwards calls fall back to the
/// default list, the per-conversation history, and echoing sends.
#[derive(Clone, Default)]
pub struct MockApi {
    state: Arc<Mutex<ApiState>>,
    delay: Arc<Mutex<Option<Duration>>>,
    list_calls: Arc<AtomicUsize>,
    message_calls: Arc<AtomicUsize>,
    send_calls: Arc<AtomicUsize>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_list(list: Vec<Conversation>) -> Self {
        let api = Self::new();
        api.set_list(list);
        api
    }

    pub fn set_list(&self, list: Vec<Conversation>) {
        self.state.lock().unwrap().list = list;
    }

    pub fn set_messages(&self, conversation_id: &str, messages: Vec<Message>) {
        self.state
            .lock()
            .unwrap()
            .messages
            .insert(conversation_id.to_string(), messages);
    }

    pub fn script_list(&self, result: ApiResult<Vec<Conversation>>) {
        self.state.lock().unwrap().list_results.push_back(result);
    }

    pub fn script_messages(&self, result: ApiResult<Vec<Message>>) {
        self.state.lock().unwrap().message_results.push_back(result);
    }

    pub fn script_send(&self, result: ApiResult<Message>) {
        self.state.lock().unwrap().send_results.push_back(result);
    }

    pub fn script_create(&self, result: ApiResult<Conversation>) {
        self.state.lock().unwrap().create_results.push_back(result);
    }

    /// Delays every response, so requests stay in flight.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn message_calls(&self) -> usize {
        self.message_calls.load(Ordering::SeqCst)
    }

    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().sent.clone()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

pub fn network_error() -> ApiError {
    ApiError::Network("connection refused".into())
}

impl RecordApi for MockApi {
    fn list_conversations(&self) -> ApiFuture<'_, Vec<Conversation>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            self.pause().await;
            let mut state = self.state.lock().unwrap();
            state
                .list_results
                .pop_front()
                .unwrap_or_else(|| Ok(state.list.clone()))
        })
    }

    fn list_messages(&self, conversation_id: &str) -> ApiFuture<'_, Vec<Message>> {
        self.message_calls.fetch_add(1, Ordering::SeqCst);
        let conversation_id = conversation_id.to_string();
        Box::pin(async move {
            self.pause().await;
            let mut state = self.state.lock().unwrap();
            state.message_results.pop_front().unwrap_or_else(|| {
                Ok(state
                    .messages
                    .get(&conversation_id)
                    .cloned()
                    .unwrap_or_default())
            })
        })
    }

    fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        content_type: ContentType,
    ) -> ApiFuture<'_, Message> {
        let n = self.send_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let conversation_id = conversation_id.to_string();
        let content = content.to_string();
        Box::pin(async move {
            self.pause().await;
            let mut state = self.state.lock().unwrap();
            state.sent.push((conversation_id.clone(), content.clone()));
            state.send_results.pop_front().unwrap_or_else(|| {
                let mut echo = message(&format!("m-srv-{}", n), &conversation_id, ME, 60);
                echo.content = content;
                echo.content_type = content_type;
                Ok(echo)
            })
        })
    }

    fn create_conversation(&self, new: &NewConversation) -> ApiFuture<'_, Conversation> {
        let new = new.clone();
        Box::pin(async move {
            self.pause().await;
            let mut state = self.state.lock().unwrap();
            state.create_results.pop_front().unwrap_or_else(|| {
                let mut participants = vec![Participant::new(ME, "Me")];
                participants.extend(
                    new.participant_ids
                        .iter()
                        .map(|id| Participant::new(id.clone(), id.to_uppercase())),
                );
                let mut conv = Conversation::new(format!("c-created-{}", new.participant_ids.join("-")))
                    .with_participants(participants);
                conv.display_name = new.name;
                conv.is_group = new.is_group;
                Ok(conv)
            })
        })
    }
}
