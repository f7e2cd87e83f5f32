// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Push session for one authenticated user.
//!
//! Wraps a [`Transport`] with connection state, a single subscriber and
//! best-effort intent emission. Connect attempts run in a background task
//! (bounded by a timeout and cancellable) so the owner's loop stays
//! responsive; the outcome comes back through [`TransportSession::next_signal`].

use std::fmt;
use std::time::Duration;

use cs_core::protocol::{ClientIntent, PushEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::transport::{Transport, TransportError, TransportResult};

/// Connection state of the push session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Events delivered to the session's subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The connection state changed.
    State(SessionState),
    /// A decoded push event, in arrival order.
    Push(PushEvent),
    /// The connection failed or was lost.
    TransportError(String),
}

/// Result of a background connect attempt. Hands the transport back.
pub struct ConnectAttempt<T> {
    id: u64,
    transport: T,
    result: TransportResult<()>,
}

impl<T> fmt::Debug for ConnectAttempt<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectAttempt")
            .field("id", &self.id)
            .field("transport", &"<transport>")
            .field("result", &self.result)
            .finish()
    }
}

/// Something the session has to react to.
#[derive(Debug)]
pub enum Signal<T> {
    Attempt(ConnectAttempt<T>),
    Received(TransportResult<Option<PushEvent>>),
}

/// Owns one transport and multiplexes it to a single subscriber.
pub struct TransportSession<T: Transport + 'static> {
    url: String,
    credential: Option<String>,
    connect_timeout: Duration,
    /// `None` while a connect attempt holds the transport.
    transport: Option<T>,
    state: SessionState,
    subscriber: Option<mpsc::UnboundedSender<SessionEvent>>,
    attempt_tx: mpsc::UnboundedSender<ConnectAttempt<T>>,
    attempt_rx: mpsc::UnboundedReceiver<ConnectAttempt<T>>,
    attempt_seq: u64,
    attempt_cancel: CancellationToken,
    /// A connect was requested while a stale attempt still held the transport.
    connect_requested: bool,
    closed: bool,
}

impl<T: Transport + 'static> TransportSession<T> {
    /// Creates a disconnected session.
    pub fn new(
        transport: T,
        url: impl Into<String>,
        credential: Option<String>,
        connect_timeout: Duration,
    ) -> Self {
        let (attempt_tx, attempt_rx) = mpsc::unbounded_channel();
        TransportSession {
            url: url.into(),
            credential: credential.filter(|c| !c.is_empty()),
            connect_timeout,
            transport: Some(transport),
            state: SessionState::Disconnected,
            subscriber: None,
            attempt_tx,
            attempt_rx,
            attempt_seq: 0,
            attempt_cancel: CancellationToken::new(),
            connect_requested: false,
            closed: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Returns the event receiver, replacing any previous subscriber.
    ///
    /// The previous receiver sees its channel close.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.subscriber.replace(tx).is_some() {
            debug!("replacing push session subscriber");
        }
        rx
    }

    /// Detaches the current subscriber.
    pub fn unsubscribe(&mut self) {
        self.subscriber = None;
    }

    /// Starts a background connect attempt.
    ///
    /// Never fails directly: the outcome is published as a state change or
    /// a `TransportError` event.
    pub fn connect(&mut self) {
        if self.closed {
            debug!("connect ignored, session is shut down");
            return;
        }
        if self.state != SessionState::Disconnected {
            debug!("connect ignored, session is {}", self.state);
            return;
        }
        if self.credential.is_none() {
            warn!("push session has no credential, not connecting");
            self.publish(SessionEvent::TransportError("no credential".into()));
            return;
        }
        if self.transport.is_none() {
            // A cancelled attempt has not handed the transport back yet.
            self.connect_requested = true;
            self.set_state(SessionState::Connecting);
            return;
        }
        self.start_attempt();
    }

    fn start_attempt(&mut self) {
        let (Some(mut transport), Some(token)) = (self.transport.take(), self.credential.clone())
        else {
            return;
        };
        self.set_state(SessionState::Connecting);
        info!("connecting to {}", self.url);

        let id = self.attempt_seq;
        let url = self.url.clone();
        let timeout = self.connect_timeout;
        let cancel = self.attempt_cancel.clone();
        let tx = self.attempt_tx.clone();

        tokio::spawn(async move {
            let result = {
                let connect = transport.connect(&url, &token);
                tokio::select! {
                    _ = cancel.cancelled() => Err(TransportError::ConnectionFailed("cancelled".into())),
                    r = tokio::time::timeout(timeout, connect) => {
                        r.unwrap_or_else(|_| Err(TransportError::Timeout(timeout.as_secs())))
                    }
                }
            };
            let _ = tx.send(ConnectAttempt {
                id,
                transport,
                result,
            });
        });
    }

    /// Waits for the next thing the session must handle.
    ///
    /// Cancel-safe, so it can sit in a `select!` next to other sources.
    pub async fn next_signal(&mut self) -> Signal<T> {
        let connected = self.state == SessionState::Connected;
        let receiving = self.transport.as_mut().filter(|_| connected);
        tokio::select! {
            Some(attempt) = self.attempt_rx.recv() => Signal::Attempt(attempt),
            result = recv_from(receiving) => Signal::Received(result),
        }
    }

    /// Applies a signal, publishing the resulting events.
    pub async fn handle_signal(&mut self, signal: Signal<T>) {
        match signal {
            Signal::Attempt(attempt) => self.finish_attempt(attempt).await,
            Signal::Received(Ok(Some(event))) => self.publish(SessionEvent::Push(event)),
            Signal::Received(Ok(None)) => self.lost("connection closed".into()).await,
            Signal::Received(Err(e)) => self.lost(e.to_string()).await,
        }
    }

    /// Waits for and handles one signal.
    pub async fn pump(&mut self) {
        let signal = self.next_signal().await;
        self.handle_signal(signal).await;
    }

    async fn finish_attempt(&mut self, attempt: ConnectAttempt<T>) {
        let ConnectAttempt {
            id,
            transport,
            result,
        } = attempt;
        let transport = self.transport.insert(transport);

        if id != self.attempt_seq {
            debug!("discarding stale connect attempt {}", id);
            if transport.is_connected() {
                let _ = transport.disconnect().await;
            }
            if std::mem::take(&mut self.connect_requested) && !self.closed {
                self.start_attempt();
            }
            return;
        }

        match result {
            Ok(()) => {
                info!("push session connected");
                self.set_state(SessionState::Connected);
            }
            Err(e) => {
                warn!("push connect failed: {}", e);
                self.publish(SessionEvent::TransportError(e.to_string()));
                self.set_state(SessionState::Disconnected);
            }
        }
    }

    /// Emits an intent if connected.
    ///
    /// Returns false if the intent was dropped or the send failed.
    pub async fn emit(&mut self, intent: ClientIntent) -> bool {
        let transport = match self.transport.as_mut() {
            Some(t) if self.state == SessionState::Connected => t,
            _ => {
                debug!("dropping {} while {}", intent.name(), self.state);
                return false;
            }
        };
        match transport.send(intent).await {
            Ok(()) => true,
            Err(e) => {
                self.lost(e.to_string()).await;
                false
            }
        }
    }

    async fn lost(&mut self, reason: String) {
        warn!("push session lost: {}", reason);
        if let Some(transport) = self.transport.as_mut() {
            let _ = transport.disconnect().await;
        }
        self.publish(SessionEvent::TransportError(reason));
        self.set_state(SessionState::Disconnected);
    }

    /// Cancels a pending attempt and closes the connection.
    pub async fn disconnect(&mut self) {
        self.connect_requested = false;
        self.attempt_cancel.cancel();
        self.attempt_cancel = CancellationToken::new();
        self.attempt_seq += 1;
        if let Some(transport) = self.transport.as_mut() {
            if transport.is_connected() {
                let _ = transport.disconnect().await;
            }
        }
        self.set_state(SessionState::Disconnected);
    }

    /// Stops the session for good: unsubscribe, cancel, disconnect.
    pub async fn shutdown(&mut self) {
        self.closed = true;
        self.unsubscribe();
        self.disconnect().await;
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            self.state = state;
            self.publish(SessionEvent::State(state));
        }
    }

    fn publish(&mut self, event: SessionEvent) {
        if let Some(tx) = &self.subscriber {
            if tx.send(event).is_err() {
                self.subscriber = None;
            }
        }
    }
}

async fn recv_from<T: Transport>(transport: Option<&mut T>) -> TransportResult<Option<PushEvent>> {
    match transport {
        Some(t) => t.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
