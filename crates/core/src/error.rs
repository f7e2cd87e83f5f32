// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for cs-core operations.

use thiserror::Error;

/// All possible errors that can occur in cs-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid presence status: '{0}'\n  hint: valid statuses are: online, offline, away, busy")]
    InvalidPresence(String),

    #[error("invalid content type: '{0}'\n  hint: valid types are: text, image, file, system")]
    InvalidContentType(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for cs-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
