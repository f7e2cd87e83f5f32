// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::common::*;
use yare::parameterized;

#[test]
fn help_lists_commands() {
    chatsync()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("tail"))
        .stdout(predicate::str::contains("send"))
        .stdout(predicate::str::contains("--config"));
}

#[parameterized(
    tail = { "tail", "--conversation" },
    send = { "send", "<CONTENT>" },
)]
fn command_help(command: &str, expected: &str) {
    chatsync()
        .args([command, "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains(expected));
}

#[test]
fn missing_command_fails() {
    chatsync().assert().failure();
}

#[test]
fn send_requires_content() {
    chatsync()
        .args(["send", "c-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("<CONTENT>"));
}
