// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use super::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use yare::parameterized;

/// Serves one canned HTTP response and returns the raw request it received.
async fn serve_once(status: u16, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        request
    });
    (format!("http://{}", addr), handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text[..end]
                .lines()
                .find_map(|l| {
                    let lower = l.to_lowercase();
                    lower
                        .strip_prefix("content-length:")
                        .map(|v| v.trim().parse::<usize>().unwrap())
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                return text;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

fn api(base: &str) -> HttpRecordApi {
    HttpRecordApi::new(base, Some("secret".into()), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn list_conversations_sends_bearer_and_decodes() {
    let (base, server) = serve_once(
        200,
        r#"{"conversations":[{"id":"c-1","participants":[],"unreadCount":2}]}"#,
    )
    .await;

    let list = api(&base).list_conversations().await.unwrap();

    assert_eq!(list.len(), 1);
    assert_eq!(list[0].id, "c-1");
    assert_eq!(list[0].unread_count, 2);
    let request = server.await.unwrap();
    assert!(request.starts_with("GET /conversations "));
    assert!(request.to_lowercase().contains("authorization: bearer secret"));
}

#[tokio::test]
async fn list_messages_stamps_conversation_id() {
    let (base, server) = serve_once(
        200,
        r#"{"messages":[{"_id":"m-1","senderId":"u-2","content":"hi","createdAt":"2026-03-01T10:00:00Z"}]}"#,
    )
    .await;

    let messages = api(&base).list_messages("c-7").await.unwrap();

    assert_eq!(messages[0].id, "m-1");
    assert_eq!(messages[0].conversation_id, "c-7");
    assert!(server
        .await
        .unwrap()
        .starts_with("GET /conversations/c-7/messages "));
}

#[tokio::test]
async fn send_message_posts_body_and_accepts_wrapped_record() {
    let (base, server) = serve_once(
        201,
        r#"{"message":{"id":"m-9","senderId":"u-1","content":"hello","createdAt":"2026-03-01T10:00:00Z"}}"#,
    )
    .await;

    let message = api(&base)
        .send_message("c-1", "hello", ContentType::Text)
        .await
        .unwrap();

    assert_eq!(message.id, "m-9");
    assert_eq!(message.conversation_id, "c-1");
    let request = server.await.unwrap();
    assert!(request.starts_with("POST /conversations/c-1/messages "));
    assert!(request.contains(r#""contentType":"text""#));
}

#[tokio::test]
async fn create_conversation_accepts_bare_record() {
    let (base, server) = serve_once(200, r#"{"id":"c-new","isGroup":true,"displayName":"Crew"}"#).await;

    let conv = api(&base)
        .create_conversation(&NewConversation::group("Crew", vec!["u-2".into(), "u-3".into()]))
        .await
        .unwrap();

    assert_eq!(conv.id, "c-new");
    assert!(conv.is_group);
    let request = server.await.unwrap();
    assert!(request.contains(r#""participantIds":["u-2","u-3"]"#));
}

#[parameterized(
    unauthorized = { 401, "", ErrorKind::Auth },
    forbidden = { 403, "", ErrorKind::Auth },
    not_found = { 404, "{}", ErrorKind::Format },
    server_error = { 500, "oops", ErrorKind::Format },
    not_json = { 200, "<html>", ErrorKind::Format },
    missing_key = { 200, r#"{"items":[]}"#, ErrorKind::Format },
)]
fn list_conversations_error_mapping(status: u16, body: &'static str, expected: ErrorKind) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let (base, _server) = serve_once(status, body).await;
        let err = api(&base).list_conversations().await.unwrap_err();
        assert_eq!(err.kind(), expected);
    });
}

#[tokio::test]
async fn missing_token_is_auth_without_request() {
    // Nothing listens here; an attempted request would be a Network error.
    let api = HttpRecordApi::new("http://127.0.0.1:1", None, Duration::from_secs(1)).unwrap();
    let err = api.list_conversations().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Auth);
}

#[tokio::test]
async fn unreachable_server_is_network() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = api(&format!("http://{}", addr))
        .list_conversations()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
}

#[test]
fn decode_record_falls_back_to_bare_value() {
    let conv: Conversation = decode_record(r#"{"id":"c-1"}"#, "conversation").unwrap();
    assert_eq!(conv.id, "c-1");
}

#[test]
fn base_url_trailing_slash_is_trimmed() {
    let api = HttpRecordApi::new("http://host/api/", None, Duration::from_secs(1)).unwrap();
    assert_eq!(api.url("/conversations"), "http://host/api/conversations");
}

#[test]
fn new_conversation_json_format() {
    let json = serde_json::to_string(&NewConversation::direct("u-2")).unwrap();
    assert_eq!(json, r#"{"participantIds":["u-2"],"isGroup":false}"#);
}
