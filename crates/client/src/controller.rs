// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Synchronization controller.
//!
//! One task owns the store, the push session and the fetch coordinator and
//! multiplexes every input in a single `select!` loop:
//! - intents from [`SyncHandle`]s
//! - push session events and connect attempts
//! - fetch results and retry timers
//! - send/create results and reconnect timers
//!
//! Store mutations happen only inside the loop, one input at a time. After
//! each input the loop publishes a [`SyncSnapshot`] over a watch channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cs_core::protocol::{ClientIntent, PushEvent};
use cs_core::{
    ContentType, Conversation, ConversationId, ConversationStore, Message, MessageId, Reconciled,
    UserId,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::{ApiResult, NewConversation, RecordApi};
use crate::config::Config;
use crate::error::{Error, ErrorKind, Result};
use crate::fetch::{Completion, FetchCoordinator, FetchEvent, ResourceKey, ResourceState, RetryPolicy};
use crate::session::{SessionEvent, SessionState, TransportSession};
use crate::transport::Transport;

/// Everything the controller needs to know about the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub user_id: UserId,
    pub user_name: String,
    pub credential: Option<String>,
    pub push_url: String,
    pub initial_conversation: Option<ConversationId>,
    pub retry: RetryPolicy,
    pub connect_timeout: Duration,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        SyncSettings {
            user_id: config.user_id.clone(),
            user_name: config.display_name().to_string(),
            credential: config.credential(),
            push_url: config.push_url.clone(),
            initial_conversation: config.initial_conversation.clone(),
            retry: config.retry.policy(),
            connect_timeout: config.connect_timeout(),
        }
    }
}

/// An error the user should see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleError {
    pub kind: ErrorKind,
    pub message: String,
    /// Whether a manual retry can help.
    pub retryable: bool,
}

/// Read-only view published after every processed input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSnapshot {
    pub store: ConversationStore,
    pub session: SessionState,
    pub list: ResourceState,
    /// A list request or a scheduled retry of it is outstanding.
    pub list_pending: bool,
    /// Load state of the open conversation's transcript.
    pub transcript: ResourceState,
    pub error: Option<VisibleError>,
    /// False once the controller loop ended.
    pub running: bool,
}

#[derive(Debug)]
enum Command {
    Select(Option<ConversationId>),
    MarkRead(ConversationId),
    Send {
        local_id: MessageId,
        conversation_id: ConversationId,
        content: String,
        content_type: ContentType,
    },
    Create(NewConversation),
    Retry,
    Logout,
    Shutdown,
}

/// Results of work the controller spawned.
#[derive(Debug)]
enum Outcome {
    Sent {
        local_id: MessageId,
        conversation_id: ConversationId,
        result: ApiResult<Message>,
    },
    Created(ApiResult<Conversation>),
    ReconnectDue,
}

/// Cloneable handle for issuing intents and observing state.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<SyncSnapshot>,
    next_local: Arc<AtomicU64>,
}

impl SyncHandle {
    fn command(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::ControllerStopped)
    }

    /// Opens a conversation: joins its room, marks it read and loads its
    /// history if needed.
    ///
    /// Rooms are never left; unread counts for the other conversations keep
    /// coming from their `message:new` events.
    pub fn select_conversation(&self, id: impl Into<ConversationId>) -> Result<()> {
        self.command(Command::Select(Some(id.into())))
    }

    /// Closes the open conversation.
    pub fn clear_selection(&self) -> Result<()> {
        self.command(Command::Select(None))
    }

    pub fn mark_read(&self, id: impl Into<ConversationId>) -> Result<()> {
        self.command(Command::MarkRead(id.into()))
    }

    /// Sends a text message optimistically.
    ///
    /// Returns the local id of the pending entry; it is replaced by the
    /// server record on confirmation or marked failed.
    pub fn send_message(
        &self,
        conversation_id: impl Into<ConversationId>,
        content: impl Into<String>,
    ) -> Result<MessageId> {
        let n = self.next_local.fetch_add(1, Ordering::Relaxed) + 1;
        let local_id = format!("local-{}", n);
        self.command(Command::Send {
            local_id: local_id.clone(),
            conversation_id: conversation_id.into(),
            content: content.into(),
            content_type: ContentType::Text,
        })?;
        Ok(local_id)
    }

    pub fn create_conversation(&self, new: NewConversation) -> Result<()> {
        self.command(Command::Create(new))
    }

    /// Clears the visible error and retries loading and connecting.
    pub fn retry(&self) -> Result<()> {
        self.command(Command::Retry)
    }

    /// Drops all state and stops the controller.
    pub fn logout(&self) -> Result<()> {
        self.command(Command::Logout)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.command(Command::Shutdown)
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SyncSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver for snapshot updates.
    pub fn watch(&self) -> watch::Receiver<SyncSnapshot> {
        self.snapshot.clone()
    }

    /// Waits until a snapshot satisfies `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SyncSnapshot) -> bool,
    ) -> Result<SyncSnapshot> {
        let mut rx = self.snapshot.clone();
        let snapshot = rx
            .wait_for(predicate)
            .await
            .map_err(|_| Error::ControllerStopped)?;
        Ok(snapshot.clone())
    }
}

/// Owner of the conversation state for one signed-in user.
pub struct SyncController<T: Transport + 'static> {
    settings: SyncSettings,
    store: ConversationStore,
    session: TransportSession<T>,
    session_rx: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    fetch: FetchCoordinator,
    fetch_rx: mpsc::UnboundedReceiver<FetchEvent>,
    api: Arc<dyn RecordApi>,
    commands: mpsc::UnboundedReceiver<Command>,
    outcomes_tx: mpsc::UnboundedSender<Outcome>,
    outcomes_rx: mpsc::UnboundedReceiver<Outcome>,
    snapshot_tx: watch::Sender<SyncSnapshot>,
    error: Option<VisibleError>,
    ever_connected: bool,
    /// Load the list as soon as the session connects (manual retry).
    load_on_connect: bool,
    reconnect_attempt: u32,
    reconnect: Option<CancellationToken>,
    cancel: CancellationToken,
    running: bool,
}

impl<T: Transport + 'static> SyncController<T> {
    /// Creates a controller and its first handle. Nothing runs until
    /// [`run`](Self::run) or [`spawn`](Self::spawn).
    pub fn new(settings: SyncSettings, transport: T, api: Arc<dyn RecordApi>) -> (Self, SyncHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        let (fetch, fetch_rx) = FetchCoordinator::new(Arc::clone(&api), settings.retry);
        let session = TransportSession::new(
            transport,
            settings.push_url.clone(),
            settings.credential.clone(),
            settings.connect_timeout,
        );
        let store = ConversationStore::new(settings.user_id.clone());
        let (snapshot_tx, snapshot_rx) = watch::channel(SyncSnapshot {
            store: store.clone(),
            running: true,
            ..Default::default()
        });

        let controller = SyncController {
            settings,
            store,
            session,
            session_rx: None,
            fetch,
            fetch_rx,
            api,
            commands,
            outcomes_tx,
            outcomes_rx,
            snapshot_tx,
            error: None,
            ever_connected: false,
            load_on_connect: false,
            reconnect_attempt: 0,
            reconnect: None,
            cancel: CancellationToken::new(),
            running: true,
        };
        let handle = SyncHandle {
            commands: commands_tx,
            snapshot: snapshot_rx,
            next_local: Arc::new(AtomicU64::new(0)),
        };
        (controller, handle)
    }

    /// Runs the controller on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Activates the session and processes inputs until shutdown or logout.
    pub async fn run(mut self) {
        self.activate();
        self.publish();

        while self.running {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("all sync handles dropped");
                        self.stop().await;
                    }
                },
                Some(event) = next_session_event(&mut self.session_rx) => {
                    self.handle_session_event(event).await;
                }
                signal = self.session.next_signal() => {
                    self.session.handle_signal(signal).await;
                }
                Some(event) = self.fetch_rx.recv() => self.handle_fetch(event),
                Some(outcome) = self.outcomes_rx.recv() => self.handle_outcome(outcome),
            }
            self.publish();
        }

        info!("sync controller stopped");
        self.publish();
    }

    fn activate(&mut self) {
        info!("activating sync for {}", self.settings.user_id);
        if self.settings.credential.is_none() {
            error!("no credential, sync stays inactive");
            self.set_error(ErrorKind::Auth, "not signed in: no credential".into(), false);
            return;
        }

        self.fetch.load(ResourceKey::List);
        self.session_rx = Some(self.session.subscribe());
        if let Some(id) = self.settings.initial_conversation.clone() {
            self.store.set_active(Some(&id));
            self.fetch.load(ResourceKey::Messages(id));
        }
        self.session.connect();
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Select(Some(id)) => self.select(id).await,
            Command::Select(None) => self.store.set_active(None),
            Command::MarkRead(id) => {
                if !self.store.mark_read(&id) {
                    debug!("mark read for unknown conversation {}", id);
                }
            }
            Command::Send {
                local_id,
                conversation_id,
                content,
                content_type,
            } => self.send(local_id, conversation_id, content, content_type),
            Command::Create(new) => {
                let api = Arc::clone(&self.api);
                self.spawn_outcome(async move { Outcome::Created(api.create_conversation(&new).await) });
            }
            Command::Retry => self.retry(),
            Command::Logout => {
                info!("logging out {}", self.settings.user_id);
                self.store.reset();
                self.error = None;
                self.stop().await;
            }
            Command::Shutdown => self.stop().await,
        }
    }

    async fn select(&mut self, id: ConversationId) {
        if self.store.is_active(&id) {
            self.store.mark_read(&id);
            return;
        }
        if self.store.conversation(&id).is_none() {
            debug!("selecting {} before it is listed", id);
        }
        self.store.set_active(Some(&id));
        self.session.emit(ClientIntent::join(id.clone())).await;

        let key = ResourceKey::Messages(id);
        if self.fetch.state(&key) != ResourceState::Loaded {
            self.fetch.load(key);
        }
    }

    fn send(
        &mut self,
        local_id: MessageId,
        conversation_id: ConversationId,
        content: String,
        content_type: ContentType,
    ) {
        let mut pending = Message::pending(
            local_id.clone(),
            conversation_id.clone(),
            self.settings.user_id.clone(),
            self.settings.user_name.clone(),
            content.clone(),
            Utc::now(),
        );
        pending.content_type = content_type;
        if !self.store.append_local(pending) {
            warn!("not sending to unknown conversation {}", conversation_id);
            self.set_error(
                ErrorKind::Format,
                format!("unknown conversation {}", conversation_id),
                false,
            );
            return;
        }

        let api = Arc::clone(&self.api);
        self.spawn_outcome(async move {
            let result = api
                .send_message(&conversation_id, &content, content_type)
                .await;
            Outcome::Sent {
                local_id,
                conversation_id,
                result,
            }
        });
    }

    fn retry(&mut self) {
        info!("manual retry");
        if self.settings.credential.is_none() {
            self.set_error(ErrorKind::Auth, "not signed in: no credential".into(), false);
            return;
        }
        self.fetch.reset();
        self.cancel_reconnect();
        self.reconnect_attempt = 0;
        self.error = None;

        if self.session.is_connected() {
            self.reload();
        } else {
            self.load_on_connect = true;
            self.session.connect();
        }
    }

    /// Loads the list and the open transcript unless already loaded or pending.
    fn reload(&mut self) {
        self.fetch.load(ResourceKey::List);
        if let Some(id) = self.store.active() {
            let key = ResourceKey::Messages(id.to_string());
            if !matches!(self.fetch.state(&key), ResourceState::Loaded) {
                self.fetch.load(key);
            }
        }
    }

    async fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::State(SessionState::Connected) => {
                let reconnected = self.ever_connected;
                self.ever_connected = true;
                self.cancel_reconnect();
                self.reconnect_attempt = 0;
                if self.error.as_ref().is_some_and(|e| e.kind == ErrorKind::Transport) {
                    self.error = None;
                }

                if reconnected {
                    info!("reconnected, refreshing");
                    self.fetch.load(ResourceKey::List);
                    if let Some(id) = self.store.active() {
                        self.fetch.load(ResourceKey::Messages(id.to_string()));
                    }
                } else if std::mem::take(&mut self.load_on_connect) {
                    self.reload();
                }

                if let Some(id) = self.store.active().map(str::to_string) {
                    self.session.emit(ClientIntent::join(id)).await;
                }
            }
            SessionEvent::State(SessionState::Disconnected) => self.schedule_reconnect(),
            SessionEvent::State(SessionState::Connecting) => {}
            SessionEvent::Push(event) => self.apply_push(&event),
            SessionEvent::TransportError(reason) => {
                self.set_error(ErrorKind::Transport, reason, true);
            }
        }
    }

    fn apply_push(&mut self, event: &PushEvent) {
        match self.store.apply_event(event) {
            Reconciled::ConnectionError(reason) => {
                warn!("server reported: {}", reason);
                self.set_error(ErrorKind::Transport, reason, true);
            }
            Reconciled::Applied | Reconciled::Ignored => {}
        }
    }

    fn schedule_reconnect(&mut self) {
        if !self.running || self.reconnect.is_some() {
            return;
        }
        let policy = self.settings.retry;
        let attempt = self.reconnect_attempt.saturating_add(1);
        if attempt > policy.max_attempts {
            error!("push session gave up after {} reconnect attempts", self.reconnect_attempt);
            self.set_error(
                ErrorKind::Transport,
                format!(
                    "connection lost after {} reconnect attempts",
                    self.reconnect_attempt
                ),
                true,
            );
            return;
        }
        self.reconnect_attempt = attempt;
        let delay = policy.delay_after(attempt);
        warn!("reconnecting in {:?} (attempt {})", delay, attempt);

        let token = self.cancel.child_token();
        self.reconnect = Some(token.clone());
        let tx = self.outcomes_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(Outcome::ReconnectDue);
                }
            }
        });
    }

    fn cancel_reconnect(&mut self) {
        if let Some(token) = self.reconnect.take() {
            token.cancel();
        }
    }

    fn handle_fetch(&mut self, event: FetchEvent) {
        match self.fetch.handle(event, &mut self.store) {
            Completion::Loaded(key) => {
                if self.error.as_ref().is_some_and(|e| e.kind != ErrorKind::Transport) {
                    self.error = None;
                }
                // The open conversation may have been selected before it was listed.
                if key == ResourceKey::List {
                    if let Some(id) = self.store.active() {
                        let messages = ResourceKey::Messages(id.to_string());
                        if self.fetch.state(&messages) == ResourceState::Idle {
                            self.fetch.load(messages);
                        }
                    }
                }
            }
            Completion::Failed { key, error, .. } => {
                let kind = error.kind();
                // Auth stays broken until the user signs in again.
                let retryable = kind != ErrorKind::Auth;
                self.set_error(kind, format!("could not load {}: {}", key, error), retryable);
            }
            Completion::RetryScheduled { .. } | Completion::Retrying { .. } | Completion::Stale => {}
        }
    }

    fn handle_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Sent {
                local_id,
                conversation_id,
                result: Ok(mut confirmed),
            } => {
                if confirmed.conversation_id.is_empty() {
                    confirmed.conversation_id = conversation_id;
                }
                debug!("{} confirmed as {}", local_id, confirmed.id);
                self.store.confirm_local(&local_id, confirmed);
            }
            Outcome::Sent {
                local_id,
                conversation_id,
                result: Err(e),
            } => {
                warn!("sending {} failed: {}", local_id, e);
                self.store.fail_local(&conversation_id, &local_id);
                self.set_error(e.kind(), format!("message not sent: {}", e), false);
            }
            Outcome::Created(Ok(conversation)) => {
                info!("created conversation {}", conversation.id);
                self.store.upsert_conversation(conversation);
            }
            Outcome::Created(Err(e)) => {
                self.set_error(e.kind(), format!("could not create conversation: {}", e), false);
            }
            Outcome::ReconnectDue => {
                if self.reconnect.take().is_some() {
                    self.session.connect();
                }
            }
        }
    }

    fn spawn_outcome(&self, work: impl std::future::Future<Output = Outcome> + Send + 'static) {
        let tx = self.outcomes_tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                outcome = work => {
                    let _ = tx.send(outcome);
                }
            }
        });
    }

    fn set_error(&mut self, kind: ErrorKind, message: String, retryable: bool) {
        self.error = Some(VisibleError {
            kind,
            message,
            retryable,
        });
    }

    async fn stop(&mut self) {
        info!("stopping sync");
        self.running = false;
        self.cancel.cancel();
        self.reconnect = None;
        self.session_rx = None;
        self.session.shutdown().await;
        self.fetch.shutdown();
    }

    fn publish(&self) {
        let transcript = self
            .store
            .active()
            .map(|id| self.fetch.state(&ResourceKey::Messages(id.to_string())))
            .unwrap_or_default();
        let next = SyncSnapshot {
            store: self.store.clone(),
            session: self.session.state(),
            list: self.fetch.state(&ResourceKey::List),
            list_pending: self.fetch.is_in_flight(&ResourceKey::List),
            transcript,
            error: self.error.clone(),
            running: self.running,
        };
        self.snapshot_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

async fn next_session_event(
    rx: &mut Option<mpsc::UnboundedReceiver<SessionEvent>>,
) -> Option<SessionEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
