// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Authoritative in-memory conversation snapshot.
//!
//! Holds the ordered conversation list, per-conversation transcripts, unread
//! counters and participant presence. Every mutation goes through a method
//! here (or through [`Reconcile`](crate::reconcile::Reconcile)) and keeps two
//! invariants:
//! - one conversation per id, and unique message ids per transcript
//! - the conversation with the most recent message activity is at index 0

use std::collections::{HashMap, HashSet};

use crate::model::{Conversation, ConversationId, Delivery, Message, MessageSummary, UserId};
use crate::protocol::PushEvent;
use crate::reconcile::{Reconcile, Reconciled};

/// Conversation list and transcripts for one authenticated user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationStore {
    /// The signed-in user; their own messages never count as unread.
    local_user: UserId,
    /// Most recent activity first.
    conversations: Vec<Conversation>,
    /// Arrival-ordered transcripts, only for conversations that were opened
    /// or received a message.
    transcripts: HashMap<ConversationId, Vec<Message>>,
    /// The conversation currently open in the UI.
    active: Option<ConversationId>,
}

impl ConversationStore {
    /// Creates an empty store for the given user.
    pub fn new(local_user: impl Into<UserId>) -> Self {
        ConversationStore {
            local_user: local_user.into(),
            ..Default::default()
        }
    }

    pub fn local_user(&self) -> &str {
        &self.local_user
    }

    /// Conversations, most recent activity first.
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    /// Transcript of a conversation, empty if never loaded.
    pub fn transcript(&self, id: &str) -> &[Message] {
        self.transcripts.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns true once a transcript was fetched or started by an event.
    pub fn has_transcript(&self, id: &str) -> bool {
        self.transcripts.contains_key(id)
    }

    /// ID of the conversation currently open, if any.
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active.as_deref() == Some(id)
    }

    /// Sum of unread counters across all conversations.
    pub fn total_unread(&self) -> u64 {
        self.conversations
            .iter()
            .map(|c| u64::from(c.unread_count))
            .sum()
    }

    /// Replaces the conversation list with a fetched one.
    ///
    /// Unread counters are client-owned: a conversation already in the store
    /// keeps its local count, the open conversation is always at 0.
    pub fn replace_list(&mut self, list: Vec<Conversation>) {
        let mut seen = HashSet::new();
        let mut next = Vec::with_capacity(list.len());

        for mut conv in list {
            if !seen.insert(conv.id.clone()) {
                continue;
            }
            conv.normalize();
            if let Some(existing) = self.conversation(&conv.id) {
                conv.unread_count = existing.unread_count;
            }
            if self.is_active(&conv.id) {
                conv.unread_count = 0;
            }
            next.push(conv);
        }

        // Stable: ties keep server order, no activity sorts last.
        next.sort_by(|a, b| b.last_activity().cmp(&a.last_activity()));

        self.transcripts.retain(|id, _| seen.contains(id));
        self.conversations = next;
    }

    /// Replaces one conversation's transcript with fetched history.
    ///
    /// Entries already held but absent from the history (pending or failed
    /// local sends, push arrivals that raced the fetch) are kept after it in
    /// arrival order. Returns false if the conversation is unknown.
    pub fn replace_transcript(&mut self, id: &str, messages: Vec<Message>) -> bool {
        if self.position(id).is_none() {
            return false;
        }

        let mut seen = HashSet::new();
        let mut next: Vec<Message> = messages
            .into_iter()
            .filter(|m| seen.insert(m.id.clone()))
            .map(|mut m| {
                m.delivery = Delivery::Confirmed;
                if m.conversation_id.is_empty() {
                    m.conversation_id = id.to_string();
                }
                m
            })
            .collect();

        if let Some(previous) = self.transcripts.remove(id) {
            next.extend(
                previous
                    .into_iter()
                    .filter(|m| !seen.contains(&m.id)),
            );
        }

        self.transcripts.insert(id.to_string(), next);
        true
    }

    /// Applies one push event through the reconciliation rules.
    pub fn apply_event(&mut self, event: &PushEvent) -> Reconciled {
        self.apply(event)
    }

    /// Resets the unread counter of a conversation.
    ///
    /// Returns false if the conversation is unknown.
    pub fn mark_read(&mut self, id: &str) -> bool {
        match self.conversations.iter_mut().find(|c| c.id == id) {
            Some(conv) => {
                conv.unread_count = 0;
                true
            }
            None => false,
        }
    }

    /// Inserts a locally created conversation at the head of the list.
    ///
    /// An existing entry with the same id is replaced (keeping its unread
    /// count) and moved to the head.
    pub fn upsert_conversation(&mut self, mut conversation: Conversation) {
        conversation.normalize();
        if let Some(idx) = self.position(&conversation.id) {
            let existing = self.conversations.remove(idx);
            conversation.unread_count = existing.unread_count;
        }
        self.conversations.insert(0, conversation);
    }

    /// Sets the open conversation; opening one also marks it read.
    pub fn set_active(&mut self, id: Option<&str>) {
        self.active = id.map(str::to_string);
        if let Some(id) = id {
            self.mark_read(id);
        }
    }

    /// Appends an optimistic, not yet confirmed message.
    ///
    /// Returns false if the conversation is unknown.
    pub fn append_local(&mut self, message: Message) -> bool {
        let Some(idx) = self.position(&message.conversation_id) else {
            return false;
        };

        self.conversations[idx].last_message = Some(MessageSummary::from(&message));
        self.move_to_head(idx);
        let id = message.conversation_id.clone();
        self.transcript_entry(&id).push(message);
        true
    }

    /// Swaps an optimistic entry for the server-confirmed message.
    ///
    /// The replacement happens in place so the transcript keeps arrival
    /// order. If the confirmed id already arrived over the push stream, the
    /// optimistic entry is dropped instead.
    pub fn confirm_local(&mut self, local_id: &str, mut confirmed: Message) -> bool {
        let conversation_id = confirmed.conversation_id.clone();
        let Some(idx) = self.position(&conversation_id) else {
            return false;
        };
        confirmed.delivery = Delivery::Confirmed;

        let summary = MessageSummary::from(&confirmed);
        let transcript = self.transcript_entry(&conversation_id);
        let echoed = transcript.iter().any(|m| m.id == confirmed.id);
        let local = transcript.iter().position(|m| m.id == local_id);

        match (local, echoed) {
            (Some(pos), true) => {
                transcript.remove(pos);
            }
            (Some(pos), false) => transcript[pos] = confirmed,
            (None, false) => transcript.push(confirmed),
            (None, true) => {}
        }

        let conv = &mut self.conversations[idx];
        if conv.last_message.as_ref().is_some_and(|m| m.id == local_id) {
            conv.last_message = Some(summary);
        }
        true
    }

    /// Marks an optimistic entry as failed to send.
    pub fn fail_local(&mut self, conversation_id: &str, local_id: &str) -> bool {
        let entry = self
            .transcripts
            .get_mut(conversation_id)
            .and_then(|t| t.iter_mut().find(|m| m.id == local_id));
        match entry {
            Some(message) => {
                message.delivery = Delivery::Failed;
                true
            }
            None => false,
        }
    }

    /// Drops everything except the local user (logout).
    pub fn reset(&mut self) {
        self.conversations.clear();
        self.transcripts.clear();
        self.active = None;
    }

    pub(crate) fn position(&self, id: &str) -> Option<usize> {
        self.conversations.iter().position(|c| c.id == id)
    }

    pub(crate) fn conversation_at_mut(&mut self, idx: usize) -> &mut Conversation {
        &mut self.conversations[idx]
    }

    pub(crate) fn conversations_mut(&mut self) -> impl Iterator<Item = &mut Conversation> {
        self.conversations.iter_mut()
    }

    pub(crate) fn transcript_entry(&mut self, id: &str) -> &mut Vec<Message> {
        self.transcripts.entry(id.to_string()).or_default()
    }

    pub(crate) fn move_to_head(&mut self, idx: usize) {
        if idx > 0 {
            let conv = self.conversations.remove(idx);
            self.conversations.insert(0, conv);
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
