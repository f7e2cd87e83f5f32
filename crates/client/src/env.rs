// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access.

use std::path::PathBuf;

/// Environment variable names read by the client.
pub mod vars {
    /// Bearer credential, overrides the config file's `token`.
    pub const CHATSYNC_TOKEN: &str = "CHATSYNC_TOKEN";
    /// Path to the config file.
    pub const CHATSYNC_CONFIG: &str = "CHATSYNC_CONFIG";
}

/// Returns the value of `CHATSYNC_TOKEN` if set and non-empty.
pub fn token() -> Option<String> {
    std::env::var(vars::CHATSYNC_TOKEN)
        .ok()
        .filter(|v| !v.trim().is_empty())
}

/// Returns the value of `CHATSYNC_CONFIG` if set.
pub fn config_path() -> Option<PathBuf> {
    std::env::var(vars::CHATSYNC_CONFIG).ok().map(PathBuf::from)
}
