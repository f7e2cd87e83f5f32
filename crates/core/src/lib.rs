// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! cs-core: Shared conversation state for the chatsync client
//!
//! This crate provides the data model, the push-event protocol, the in-memory
//! conversation store and the reconciliation rules that merge push events into
//! it. Nothing here performs I/O; the `chatsync` crate drives it.

pub mod error;
pub mod model;
pub mod protocol;
pub mod reconcile;
pub mod store;

pub use error::{Error, Result};
pub use model::{
    ContentType, Conversation, ConversationId, Delivery, Message, MessageId, MessageSummary,
    Participant, Presence, PresenceStatus, UserId,
};
pub use protocol::{ClientIntent, PushEvent};
pub use reconcile::{Reconcile, Reconciled};
pub use store::ConversationStore;
