// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Black-box specs for the `chatsync` binary.

#[cfg(test)]
mod cli;
