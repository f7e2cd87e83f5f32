// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use thiserror::Error;

/// Failure classes the sync core distinguishes.
///
/// Only `Network` is retried automatically; the others stay visible until
/// the user acts (re-login, manual retry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transient transport/HTTP failure.
    Network,
    /// Missing or rejected credential.
    Auth,
    /// Response shape did not match the contract.
    Format,
    /// Push session failure.
    Transport,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Auth => "auth",
            ErrorKind::Format => "format",
            ErrorKind::Transport => "transport",
        }
    }

    /// Returns true if the fetch layer retries this kind on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Network)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// All possible errors that can occur in the chatsync library.
#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("config file not found: {0}\n  hint: pass --config or set CHATSYNC_CONFIG")]
    ConfigNotFound(String),

    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unknown conversation: {0}\n  hint: run `chatsync tail` to list conversations")]
    UnknownConversation(String),

    #[error("message not sent: {0}")]
    SendFailed(String),

    #[error("sync controller is not running")]
    ControllerStopped,
}

/// A specialized Result type for chatsync operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
