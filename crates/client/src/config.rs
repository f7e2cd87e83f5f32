// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client configuration.
//!
//! Stored as TOML, by default in `<config dir>/chatsync/config.toml`:
//! - `api_url`: record API base (`http://` or `https://`)
//! - `push_url`: push endpoint (`ws://` or `wss://`)
//! - `user_id`, `user_name`: the signed-in user
//! - `token`: bearer credential; `CHATSYNC_TOKEN` overrides it
//! - `initial_conversation`: conversation to open on start
//! - `[retry]` and `[connection]`: timing knobs

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::env;
use crate::error::{Error, Result};
use crate::fetch::RetryPolicy;

const CONFIG_DIR_NAME: &str = "chatsync";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Client configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub api_url: String,
    pub push_url: String,
    pub user_id: String,
    /// Display name for optimistic messages (defaults to `user_id`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_conversation: Option<String>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
}

/// Backoff for list/transcript fetches and push reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay unit in milliseconds; attempt `n` waits `n * base_delay_ms` (default: 5000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Attempts before giving up, the first one included (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            base_delay_ms: default_base_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_attempts: self.max_attempts,
        }
    }
}

/// Network timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Max time for the push handshake in seconds (default: 5).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Max time for one record API request in seconds (default: 30).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    5_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Loads and validates a config file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks URL schemes and required fields.
    pub fn validate(&self) -> Result<()> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "invalid api_url '{}'\n  hint: must start with http:// or https://",
                self.api_url
            )));
        }
        if !(self.push_url.starts_with("ws://") || self.push_url.starts_with("wss://")) {
            return Err(Error::Config(format!(
                "invalid push_url '{}'\n  hint: must start with ws:// or wss://",
                self.push_url
            )));
        }
        if self.user_id.trim().is_empty() {
            return Err(Error::Config("user_id must not be empty".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Bearer credential: `CHATSYNC_TOKEN` first, then the file's `token`.
    pub fn credential(&self) -> Option<String> {
        env::token().or_else(|| self.token.clone().filter(|t| !t.trim().is_empty()))
    }

    /// Display name used for the local user's optimistic messages.
    pub fn display_name(&self) -> &str {
        self.user_name.as_deref().unwrap_or(&self.user_id)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.request_timeout_secs)
    }

    /// Writes the config as pretty TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }
}

/// Default config location under the platform config directory.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Picks the config file: explicit path, then `CHATSYNC_CONFIG`, then the default.
pub fn resolve_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    explicit
        .or_else(env::config_path)
        .or_else(default_path)
        .ok_or_else(|| Error::Config("cannot determine config directory".to_string()))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
