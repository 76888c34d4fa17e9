use crate::broker::Relay;
use crate::config::Settings;
use crate::transport::websocket::{accept_with_backoff, bind, serve};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server(settings: Settings) -> (SocketAddr, Relay) {
    let (relay, dispatcher) = Relay::new(settings.relay.queue_capacity);
    tokio::spawn(dispatcher.run());

    let listener = bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, relay.clone(), settings.relay));
    (addr, relay)
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}"))
        .await
        .expect("client connect");
    ws
}

async fn send_json(ws: &mut Client, value: serde_json::Value) {
    ws.send(WsMessage::Text(value.to_string().into()))
        .await
        .expect("send");
}

async fn next_text(ws: &mut Client) -> Option<serde_json::Value> {
    match tokio::time::timeout(Duration::from_millis(500), ws.next()).await {
        Ok(Some(Ok(WsMessage::Text(text)))) => Some(serde_json::from_str(text.as_str()).unwrap()),
        _ => None,
    }
}

/// Waits until the registry reports `expected` subscribers for `chat`.
async fn wait_for_subscribers(relay: &Relay, chat: &str, expected: usize) {
    for _ in 0..100 {
        if relay.registry().subscriber_count(chat) == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {expected} subscribers on {chat}, found {}",
        relay.registry().subscriber_count(chat)
    );
}

#[tokio::test]
async fn test_fan_out_between_real_clients() {
    let (addr, relay) = start_server(Settings::default()).await;
    let mut c1 = connect(addr).await;
    let mut c2 = connect(addr).await;
    let mut c3 = connect(addr).await;

    send_json(&mut c1, json!({ "messageType": "setup", "chat": "chat42" })).await;
    send_json(&mut c2, json!({ "messageType": "setup", "chat": "chat42" })).await;
    send_json(&mut c3, json!({ "messageType": "setup", "chat": "chat7" })).await;
    wait_for_subscribers(&relay, "chat42", 2).await;
    wait_for_subscribers(&relay, "chat7", 1).await;

    let message = json!({ "chat": "chat42", "sender": "u1", "content": "hi" });
    send_json(&mut c1, message.clone()).await;

    assert_eq!(next_text(&mut c1).await, Some(message.clone()));
    assert_eq!(next_text(&mut c2).await, Some(message));
    assert_eq!(next_text(&mut c3).await, None);
}

#[tokio::test]
async fn test_disconnect_removes_subscriptions() {
    let (addr, relay) = start_server(Settings::default()).await;
    let mut c1 = connect(addr).await;
    let mut c2 = connect(addr).await;

    send_json(&mut c1, json!({ "messageType": "setup", "chat": "chat42" })).await;
    send_json(&mut c1, json!({ "messageType": "setup", "chat": "chat9" })).await;
    wait_for_subscribers(&relay, "chat9", 1).await;

    c1.close(None).await.expect("close");
    wait_for_subscribers(&relay, "chat42", 0).await;
    wait_for_subscribers(&relay, "chat9", 0).await;

    // nobody is listening any more; the relay must shrug it off
    send_json(&mut c2, json!({ "chat": "chat42", "content": "anyone?" })).await;
    assert_eq!(next_text(&mut c2).await, None);
    assert_eq!(relay.registry().topic_count(), 0);
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let (addr, relay) = start_server(Settings::default()).await;
    let mut c1 = connect(addr).await;

    c1.send(WsMessage::Text("{not json".into())).await.unwrap();
    send_json(&mut c1, json!({ "content": "missing chat" })).await;
    send_json(&mut c1, json!({ "messageType": "setup", "chat": "chat42" })).await;
    wait_for_subscribers(&relay, "chat42", 1).await;

    let message = json!({ "chat": "chat42", "content": "still alive" });
    send_json(&mut c1, message.clone()).await;
    assert_eq!(next_text(&mut c1).await, Some(message));
}

#[tokio::test]
async fn test_connection_limit_rejects_extra_clients() {
    let mut settings = Settings::default();
    settings.relay.max_connections = 1;
    let (addr, relay) = start_server(settings).await;

    let mut c1 = connect(addr).await;
    send_json(&mut c1, json!({ "messageType": "setup", "chat": "chat42" })).await;
    wait_for_subscribers(&relay, "chat42", 1).await;

    let mut c2 = connect(addr).await;
    match tokio::time::timeout(Duration::from_secs(2), c2.next()).await {
        Ok(Some(Ok(WsMessage::Close(Some(frame))))) => {
            assert_eq!(frame.reason.as_str(), "server is full");
        }
        other => panic!("expected a close frame, got {other:?}"),
    }
}

/// Connects until the server admits the client into `chat`, or gives up.
async fn join_when_admitted(addr: SocketAddr, relay: &Relay, chat: &str) -> Option<Client> {
    for _ in 0..25 {
        let mut ws = connect(addr).await;
        let setup = json!({ "messageType": "setup", "chat": chat }).to_string();
        // a rejected client may already be closed by the server
        if ws.send(WsMessage::Text(setup.into())).await.is_err() {
            tokio::time::sleep(Duration::from_millis(100)).await;
            continue;
        }
        for _ in 0..20 {
            if relay.registry().subscriber_count(chat) == 1 {
                return Some(ws);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    None
}

#[tokio::test]
async fn test_stalled_reader_releases_its_connection_slot() {
    let mut settings = Settings::default();
    settings.relay.max_connections = 2;
    settings.relay.outbound_buffer = 8;
    let (addr, relay) = start_server(settings).await;

    // joins and then never reads again
    let mut stalled = connect(addr).await;
    send_json(&mut stalled, json!({ "messageType": "setup", "chat": "big" })).await;
    wait_for_subscribers(&relay, "big", 1).await;

    let mut flooder = connect(addr).await;
    let content = "x".repeat(64 * 1024);
    let mut dropped = false;
    for _ in 0..4000 {
        send_json(&mut flooder, json!({ "chat": "big", "content": content })).await;
        if relay.registry().subscriber_count("big") == 0 {
            dropped = true;
            break;
        }
    }
    assert!(dropped, "slow subscriber was never removed");

    // the stalled client is still connected on its side, but its slot must be free again
    let third = join_when_admitted(addr, &relay, "after").await;
    assert!(third.is_some(), "connection slot of the stalled client was never released");
    drop(stalled);
}

#[tokio::test]
async fn test_accept_errors_are_retried() {
    let mut attempts = 0;
    let accepted = accept_with_backoff(|| {
        attempts += 1;
        let attempt = attempts;
        async move {
            if attempt < 3 {
                Err(io::Error::other("too many open files"))
            } else {
                Ok(attempt)
            }
        }
    })
    .await;

    assert_eq!(accepted, 3);
}
