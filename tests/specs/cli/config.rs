// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::common::*;
use yare::parameterized;

#[test]
fn missing_config_file_shows_hint() {
    let temp = TempDir::new().unwrap();
    chatsync()
        .arg("--config")
        .arg(temp.path().join("absent.toml"))
        .args(["send", "c-1", "hi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file not found"))
        .stderr(predicate::str::contains("hint"));
}

#[test]
fn config_env_var_is_used() {
    let temp = TempDir::new().unwrap();
    chatsync()
        .env("CHATSYNC_CONFIG", temp.path().join("from-env.toml"))
        .args(["send", "c-1", "hi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("from-env.toml"));
}

#[parameterized(
    bad_api = { "api_url = \"ftp://x\"\npush_url = \"ws://y\"\nuser_id = \"u-1\"\n", "api_url" },
    bad_push = { "api_url = \"http://x\"\npush_url = \"http://y\"\nuser_id = \"u-1\"\n", "push_url" },
    not_toml = { "api_url = [", "invalid config file" },
)]
fn invalid_config_is_rejected(content: &str, expected: &str) {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(&path, content).unwrap();

    chatsync()
        .arg("--config")
        .arg(&path)
        .args(["send", "c-1", "hi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(expected));
}
