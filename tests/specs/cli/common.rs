// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

// Allow unused items: test helpers are shared across multiple test files,
// and not every test file uses every helper.
#![allow(dead_code)]
#![allow(unused_imports)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use assert_cmd::Command;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub use predicates::prelude::*;
pub use tempfile::TempDir;

/// The binary with a clean environment.
pub fn chatsync() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("chatsync").unwrap();
    cmd.env_remove("CHATSYNC_TOKEN")
        .env_remove("CHATSYNC_CONFIG")
        .env("RUST_LOG", "warn");
    cmd
}

/// An address nothing listens on.
pub fn dead_addr() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

/// Writes a config pointing at `addr` with fast retries.
pub fn write_config(temp: &TempDir, addr: &str, token: Option<&str>) -> PathBuf {
    let token = token
        .map(|t| format!("token = \"{}\"\n", t))
        .unwrap_or_default();
    let content = format!(
        r#"api_url = "http://{addr}/api"
push_url = "ws://{addr}/socket"
user_id = "u-1"
{token}
[retry]
base_delay_ms = 10
max_attempts = 2

[connection]
connect_timeout_secs = 1
request_timeout_secs = 1
"#
    );
    let path = temp.path().join("config.toml");
    std::fs::write(&path, content).unwrap();
    path
}

const LIST_BODY: &str = r#"{"conversations":[{"id":"c-1","participants":[
    {"userId":"u-1","name":"Me"},{"userId":"u-2","name":"Ana"}]}]}"#;

const SENT_BODY: &str = r#"{"id":"m-1","conversationId":"c-1","senderId":"u-1",
    "senderName":"Me","content":"hi","contentType":"text","createdAt":"2026-03-01T10:00:00Z"}"#;

/// A record API on a local port listing `c-1` and accepting sends to it.
///
/// The first `drop_lists` list requests are cut off before any response.
pub fn record_api(drop_lists: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let list_requests = Arc::new(AtomicUsize::new(0));
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            let list_requests = Arc::clone(&list_requests);
            std::thread::spawn(move || serve(stream, &list_requests, drop_lists));
        }
    });
    addr
}

fn serve(mut stream: TcpStream, list_requests: &AtomicUsize, drop_lists: usize) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut request_line = String::new();
    reader.read_line(&mut request_line).unwrap();
    let mut content_length = 0;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap() == 0 {
            return;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap();
            }
        }
    }
    let mut body = vec![0; content_length];
    reader.read_exact(&mut body).unwrap();

    let (status, json) = if request_line.starts_with("GET /api/conversations ") {
        if list_requests.fetch_add(1, Ordering::SeqCst) < drop_lists {
            return;
        }
        ("200 OK", LIST_BODY)
    } else if request_line.starts_with("POST /api/conversations/c-1/messages ") {
        ("200 OK", SENT_BODY)
    } else {
        ("404 Not Found", "{}")
    };
    write!(
        stream,
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        json.len(),
        json
    )
    .unwrap();
}
