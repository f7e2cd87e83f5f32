// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::common::*;

#[test]
fn send_without_credential_fails_with_auth_error() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp, &dead_addr(), None);

    chatsync()
        .arg("--config")
        .arg(&config)
        .args(["send", "c-1", "hi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not signed in"));
}

#[test]
fn env_token_is_used_when_file_has_none() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp, &dead_addr(), None);

    // Gets past the credential check and fails on the unreachable server.
    chatsync()
        .env("CHATSYNC_TOKEN", "from-env")
        .arg("--config")
        .arg(&config)
        .args(["send", "c-1", "hi"])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .failure()
        .stderr(predicate::str::contains("not signed in").not())
        .stderr(predicate::str::contains("message not sent"));
}

#[test]
fn send_to_unreachable_server_fails_after_retries() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp, &dead_addr(), Some("tok"));

    chatsync()
        .arg("--config")
        .arg(&config)
        .args(["send", "c-1", "hi"])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .failure()
        .stderr(predicate::str::contains("message not sent"));
}

#[test]
fn send_waits_out_a_transient_list_failure() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp, &record_api(1), Some("tok"));

    chatsync()
        .arg("--config")
        .arg(&config)
        .args(["send", "c-1", "hi"])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("sent to c-1"));
}

#[test]
fn send_to_unlisted_conversation_is_rejected() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp, &record_api(0), Some("tok"));

    chatsync()
        .arg("--config")
        .arg(&config)
        .args(["send", "c-9", "hi"])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown conversation: c-9"));
}
