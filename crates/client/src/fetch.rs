// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Fetch coordination for the conversation list and transcripts.
//!
//! Each resource moves through `Idle -> Loading -> Loaded | Failed`. A load
//! for a resource that is already loading (or waiting for a retry) joins
//! the pending request instead of issuing a second one. Network failures
//! are retried with a linear backoff up to a ceiling; auth and format
//! failures surface immediately.
//!
//! Requests and retry timers run as spawned tasks that report back over a
//! channel, so the owner applies every outcome on its own task. Each
//! request is stamped with the coordinator's generation; outcomes from an
//! older generation are discarded.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cs_core::{Conversation, ConversationId, ConversationStore, Message};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::{ApiError, ApiResult, RecordApi};
use crate::error::ErrorKind;

/// A fetchable resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    List,
    Messages(ConversationId),
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKey::List => write!(f, "conversation list"),
            ResourceKey::Messages(id) => write!(f, "messages of {}", id),
        }
    }
}

/// Load state of one resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResourceState {
    #[default]
    Idle,
    Loading {
        attempt: u32,
    },
    Loaded,
    Failed {
        kind: ErrorKind,
        attempt: u32,
    },
}

impl ResourceState {
    pub fn is_loading(&self) -> bool {
        matches!(self, ResourceState::Loading { .. })
    }
}

/// Retry schedule for network failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    /// Total attempts, the first one included.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            base_delay: Duration::from_secs(5),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following failed attempt `attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Returns true if another attempt is allowed after `attempt`.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// What `load` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A request was issued.
    Start { attempt: u32, generation: u64 },
    /// A request or retry for the resource is already pending.
    Joined,
}

/// Fetched payload.
#[derive(Debug)]
pub enum Fetched {
    List(ApiResult<Vec<Conversation>>),
    Messages(ConversationId, ApiResult<Vec<Message>>),
}

impl Fetched {
    fn key(&self) -> ResourceKey {
        match self {
            Fetched::List(_) => ResourceKey::List,
            Fetched::Messages(id, _) => ResourceKey::Messages(id.clone()),
        }
    }
}

/// A finished request, stamped with the generation that issued it.
#[derive(Debug)]
pub struct FetchOutcome {
    pub generation: u64,
    pub fetched: Fetched,
}

/// Messages from spawned requests and timers back to the owner.
#[derive(Debug)]
pub enum FetchEvent {
    Finished(FetchOutcome),
    RetryDue { key: ResourceKey, generation: u64 },
}

/// What applying a [`FetchEvent`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The store was updated from a successful fetch.
    Loaded(ResourceKey),
    /// A network failure; another attempt follows after `delay`.
    RetryScheduled {
        key: ResourceKey,
        attempt: u32,
        delay: Duration,
    },
    /// Final failure for this cycle, to be surfaced.
    Failed {
        key: ResourceKey,
        error: ApiError,
        attempt: u32,
    },
    /// A scheduled retry was issued.
    Retrying { key: ResourceKey, attempt: u32 },
    /// Outcome of a superseded generation or an unexpected event.
    Stale,
}

#[derive(Debug, Default)]
struct Entry {
    state: ResourceState,
    attempt: u32,
    retry: Option<CancellationToken>,
}

impl Entry {
    fn in_flight(&self) -> bool {
        self.state.is_loading() || self.retry.is_some()
    }

    fn cancel_retry(&mut self) {
        if let Some(token) = self.retry.take() {
            token.cancel();
        }
    }
}

/// Issues record API requests and applies their outcomes to the store.
pub struct FetchCoordinator {
    api: Arc<dyn RecordApi>,
    policy: RetryPolicy,
    entries: HashMap<ResourceKey, Entry>,
    generation: u64,
    events_tx: mpsc::UnboundedSender<FetchEvent>,
    cancel: CancellationToken,
}

impl FetchCoordinator {
    /// Creates a coordinator and the receiver its tasks report to.
    pub fn new(
        api: Arc<dyn RecordApi>,
        policy: RetryPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<FetchEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let coordinator = FetchCoordinator {
            api,
            policy,
            entries: HashMap::new(),
            generation: 0,
            events_tx,
            cancel: CancellationToken::new(),
        };
        (coordinator, events_rx)
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self, key: &ResourceKey) -> ResourceState {
        self.entries.get(key).map(|e| e.state).unwrap_or_default()
    }

    /// Returns true while a request or a scheduled retry is pending.
    pub fn is_in_flight(&self, key: &ResourceKey) -> bool {
        self.entries.get(key).is_some_and(Entry::in_flight)
    }

    /// Requests a resource, joining any pending request for it.
    pub fn load(&mut self, key: ResourceKey) -> Dispatch {
        let entry = self.entries.entry(key.clone()).or_default();
        if entry.in_flight() {
            debug!("{} already in flight", key);
            return Dispatch::Joined;
        }
        entry.attempt = 1;
        self.start(key)
    }

    fn start(&mut self, key: ResourceKey) -> Dispatch {
        let entry = self.entries.entry(key.clone()).or_default();
        let attempt = entry.attempt;
        entry.state = ResourceState::Loading { attempt };
        info!("loading {} (attempt {})", key, attempt);

        let api = Arc::clone(&self.api);
        let tx = self.events_tx.clone();
        let cancel = self.cancel.clone();
        let generation = self.generation;

        tokio::spawn(async move {
            let request = async {
                match key {
                    ResourceKey::List => Fetched::List(api.list_conversations().await),
                    ResourceKey::Messages(id) => {
                        let result = api.list_messages(&id).await;
                        Fetched::Messages(id, result)
                    }
                }
            };
            tokio::select! {
                _ = cancel.cancelled() => {}
                fetched = request => {
                    let _ = tx.send(FetchEvent::Finished(FetchOutcome { generation, fetched }));
                }
            }
        });

        Dispatch::Start {
            attempt,
            generation,
        }
    }

    /// Applies one event from a request or timer task.
    pub fn handle(&mut self, event: FetchEvent, store: &mut ConversationStore) -> Completion {
        match event {
            FetchEvent::Finished(outcome) => self.complete(outcome, store),
            FetchEvent::RetryDue { key, generation } => self.retry_due(key, generation),
        }
    }

    /// Applies a finished request to the store and advances the state machine.
    pub fn complete(&mut self, outcome: FetchOutcome, store: &mut ConversationStore) -> Completion {
        let key = outcome.fetched.key();
        if outcome.generation != self.generation {
            debug!("discarding {} from generation {}", key, outcome.generation);
            return Completion::Stale;
        }
        let policy = self.policy;
        let Some(entry) = self.entries.get_mut(&key).filter(|e| e.state.is_loading()) else {
            debug!("discarding unexpected result for {}", key);
            return Completion::Stale;
        };
        let attempt = entry.attempt;

        let error = match outcome.fetched {
            Fetched::List(Ok(list)) => {
                store.replace_list(list);
                None
            }
            Fetched::Messages(id, Ok(messages)) => {
                if !store.replace_transcript(&id, messages) {
                    // Not listed (yet); leave it to be loaded again once it is.
                    debug!("dropping messages for unlisted conversation {}", id);
                    entry.state = ResourceState::Idle;
                    entry.attempt = 0;
                    return Completion::Stale;
                }
                None
            }
            Fetched::List(Err(e)) | Fetched::Messages(_, Err(e)) => Some(e),
        };

        let Some(error) = error else {
            info!("loaded {}", key);
            entry.state = ResourceState::Loaded;
            entry.attempt = 0;
            return Completion::Loaded(key);
        };

        let kind = error.kind();
        entry.state = ResourceState::Failed { kind, attempt };

        if kind.is_retryable() && policy.allows_retry(attempt) {
            let delay = policy.delay_after(attempt);
            warn!("loading {} failed ({}), retrying in {:?}", key, error, delay);
            let token = self.cancel.child_token();
            entry.retry = Some(token.clone());
            self.schedule_retry(key.clone(), delay, token);
            Completion::RetryScheduled {
                key,
                attempt,
                delay,
            }
        } else {
            error!("loading {} failed after {} attempt(s): {}", key, attempt, error);
            Completion::Failed {
                key,
                error,
                attempt,
            }
        }
    }

    fn schedule_retry(&self, key: ResourceKey, delay: Duration, token: CancellationToken) {
        let tx = self.events_tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(FetchEvent::RetryDue { key, generation });
                }
            }
        });
    }

    fn retry_due(&mut self, key: ResourceKey, generation: u64) -> Completion {
        if generation != self.generation {
            return Completion::Stale;
        }
        let Some(entry) = self.entries.get_mut(&key) else {
            return Completion::Stale;
        };
        match entry.retry.take() {
            Some(token) if !token.is_cancelled() => {}
            _ => return Completion::Stale,
        }
        entry.attempt = entry.attempt.saturating_add(1);
        match self.start(key.clone()) {
            Dispatch::Start { attempt, .. } => Completion::Retrying { key, attempt },
            Dispatch::Joined => Completion::Stale,
        }
    }

    /// Manual retry: cancels scheduled retries and restarts attempt counting.
    ///
    /// Failed resources go back to `Idle`; a request still in flight keeps
    /// running and counts as the first attempt of the new cycle.
    pub fn reset(&mut self) {
        for entry in self.entries.values_mut() {
            entry.cancel_retry();
            match entry.state {
                ResourceState::Loading { .. } => {
                    entry.attempt = 1;
                    entry.state = ResourceState::Loading { attempt: 1 };
                }
                ResourceState::Failed { .. } => {
                    entry.attempt = 0;
                    entry.state = ResourceState::Idle;
                }
                _ => entry.attempt = 0,
            }
        }
    }

    /// Forgets all resources and cancels every request and timer.
    ///
    /// Results of requests issued before this call are discarded.
    pub fn invalidate(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.generation = self.generation.wrapping_add(1);
        self.entries.clear();
    }

    pub fn shutdown(&mut self) {
        debug!("fetch coordinator shutting down");
        self.invalidate();
    }
}

#[cfg(test)]
#[path = "fetch_tests.rs"]
mod tests;
