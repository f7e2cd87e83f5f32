// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! chatsync: real-time conversation synchronization client.
//!
//! Keeps a user's conversation list and open transcript consistent across
//! three racing sources: the bulk fetch from the record API, the push-event
//! stream, and local optimistic actions.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐ intents ┌──────────────────┐   fetch   ┌─────────────┐
//! │  SyncHandle  │────────►│  SyncController  │──────────►│  RecordApi  │
//! │ (UI / CLI)   │◄────────│  (single loop)   │◄──────────│   (HTTP)    │
//! └──────────────┘ snapshot└──────────────────┘           └─────────────┘
//!                              │        ▲
//!                      store   │        │ session events
//!                              ▼        │
//!                  ┌──────────────┐  ┌──────────────────┐  ┌───────────┐
//!                  │ Conversation │  │ TransportSession │─►│ Transport │
//!                  │    Store     │  │                  │◄─│  (trait)  │
//!                  └──────────────┘  └──────────────────┘  └───────────┘
//! ```

pub mod api;
pub mod config;
pub mod controller;
pub mod env;
pub mod error;
pub mod fetch;
pub mod session;
pub mod transport;

pub use api::{ApiError, HttpRecordApi, NewConversation, RecordApi};
pub use config::Config;
pub use controller::{SyncController, SyncHandle, SyncSettings, SyncSnapshot, VisibleError};
pub use error::{Error, ErrorKind, Result};
pub use fetch::{FetchCoordinator, ResourceKey, ResourceState, RetryPolicy};
pub use session::{SessionEvent, SessionState, TransportSession};
pub use transport::{Transport, TransportError, WebSocketTransport};

#[cfg(test)]
mod test_helpers;
