// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Merge push events into the conversation store.
//!
//! Merge rules:
//! - message:new: ignored for unknown conversations and already-seen ids;
//!   otherwise appended, summarized, counted unread (inactive conversation,
//!   foreign sender only) and moved to the head of the list
//! - conversation:update: overwrite one participant's read receipt
//! - presence:update: overwrite the status of the user in every conversation
//! - error: no state change, surfaced to the caller
//!
//! Unknown conversations and participants are benign races with the list
//! fetch and resolve to a silent no-op. All rules are idempotent.

use tracing::debug;

use crate::model::{Delivery, Message, MessageSummary, PresenceStatus};
use crate::protocol::PushEvent;
use crate::store::ConversationStore;

/// Result of reconciling one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// The store changed.
    Applied,
    /// The event was a duplicate or referenced unknown state.
    Ignored,
    /// The server reported a connection error; the store is untouched.
    ConnectionError(String),
}

/// Trait for applying push events under the merge rules.
pub trait Reconcile {
    /// Applies a single event.
    fn apply(&mut self, event: &PushEvent) -> Reconciled;

    /// Applies events in delivery order.
    ///
    /// Returns the number of events that changed the store.
    fn apply_all(&mut self, events: &[PushEvent]) -> usize {
        events
            .iter()
            .filter(|event| self.apply(event) == Reconciled::Applied)
            .count()
    }
}

impl Reconcile for ConversationStore {
    fn apply(&mut self, event: &PushEvent) -> Reconciled {
        match event {
            PushEvent::MessageNew { message } => apply_new_message(self, message),

            PushEvent::ConversationUpdate {
                conversation_id,
                user_id,
                last_read_message_id,
                last_read_at,
            } => {
                let Some(idx) = self.position(conversation_id) else {
                    debug!("read receipt for unknown conversation {}", conversation_id);
                    return Reconciled::Ignored;
                };
                match self.conversation_at_mut(idx).participant_mut(user_id) {
                    Some(participant) => {
                        participant.last_read_message_id = last_read_message_id.clone();
                        participant.last_read_at = *last_read_at;
                        Reconciled::Applied
                    }
                    None => {
                        debug!(
                            "read receipt for unknown participant {} in {}",
                            user_id, conversation_id
                        );
                        Reconciled::Ignored
                    }
                }
            }

            PushEvent::PresenceUpdate { user_id, status } => {
                apply_presence(self, user_id, *status)
            }

            PushEvent::Error { reason } => Reconciled::ConnectionError(reason.clone()),
        }
    }
}

fn apply_new_message(store: &mut ConversationStore, message: &Message) -> Reconciled {
    let conversation_id = message.conversation_id.as_str();

    // A bare message never creates a conversation; the next list fetch will.
    let Some(idx) = store.position(conversation_id) else {
        debug!(
            "message {} for unknown conversation {}",
            message.id, conversation_id
        );
        return Reconciled::Ignored;
    };

    if store
        .transcript(conversation_id)
        .iter()
        .any(|m| m.id == message.id)
    {
        debug!("duplicate message {} ignored", message.id);
        return Reconciled::Ignored;
    }

    let counts_unread =
        !store.is_active(conversation_id) && message.sender_id != store.local_user();

    let mut confirmed = message.clone();
    confirmed.delivery = Delivery::Confirmed;
    let summary = MessageSummary::from(&confirmed);
    store.transcript_entry(conversation_id).push(confirmed);

    let conv = store.conversation_at_mut(idx);
    conv.last_message = Some(summary);
    if counts_unread {
        conv.unread_count = conv.unread_count.saturating_add(1);
    }

    store.move_to_head(idx);
    Reconciled::Applied
}

fn apply_presence(store: &mut ConversationStore, user_id: &str, status: PresenceStatus) -> Reconciled {
    let mut matched = false;
    for conv in store.conversations_mut() {
        if let Some(participant) = conv.participant_mut(user_id) {
            participant.presence.status = status;
            matched = true;
        }
    }

    if matched {
        Reconciled::Applied
    } else {
        Reconciled::Ignored
    }
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
