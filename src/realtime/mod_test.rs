use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use serde_json::{Value, json};

use super::*;
use crate::session::MemoryTokenStore;

type Accepted = (String, WebSocket);

const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// HELPERS
// =============================================================================

async fn upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<HashMap<String, String>>,
    State(accepted): State<mpsc::UnboundedSender<Accepted>>,
) -> Response {
    let token = query.get("token").cloned().unwrap_or_default();
    ws.on_upgrade(move |socket| async move {
        let _ = accepted.send((token, socket));
    })
}

/// Socket server that hands every accepted connection to the test.
async fn spawn_socket_server() -> (String, mpsc::UnboundedReceiver<Accepted>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new().route("/ws", get(upgrade)).with_state(tx);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (format!("ws://{addr}/ws"), rx)
}

/// A URL nothing listens on.
fn refused_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    format!("ws://{addr}/ws")
}

fn authed_session(token: &str) -> Session {
    Session::load(MemoryTokenStore::with_token(token)).expect("session")
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy { max_attempts: 3, backoff: Backoff::Fixed(Duration::from_millis(50)) }
}

async fn accept(rx: &mut mpsc::UnboundedReceiver<Accepted>) -> Accepted {
    tokio::time::timeout(WAIT, rx.recv()).await.expect("no connection").expect("server gone")
}

async fn wait_for_state(client: &RealtimeClient, state: ConnectionState) {
    let mut watch = client.watch_state();
    tokio::time::timeout(WAIT, watch.wait_for(|current| *current == state))
        .await
        .expect("state timeout")
        .expect("state channel closed");
}

async fn next_event(events: &mut broadcast::Receiver<ConnectionEvent>) -> ConnectionEvent {
    tokio::time::timeout(WAIT, events.recv()).await.expect("event timeout").expect("event channel")
}

async fn push(socket: &mut WebSocket, text: &str) {
    socket.send(WsMessage::Text(text.into())).await.expect("server send");
}

async fn received_json(socket: &mut WebSocket) -> Value {
    let message = tokio::time::timeout(WAIT, socket.recv()).await.expect("recv timeout");
    let Some(Ok(WsMessage::Text(text))) = message else {
        panic!("expected a text frame, got {message:?}");
    };
    serde_json::from_str(text.as_str()).expect("client sent JSON")
}

// =============================================================================
// CONNECT / DISCONNECT
// =============================================================================

#[tokio::test]
async fn connect_without_token_does_nothing() {
    let (url, _accepted) = spawn_socket_server().await;
    let client = RealtimeClient::new(url, Session::in_memory(), fast_policy());
    let mut events = client.subscribe();

    client.connect();

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn connect_sends_token_as_query_parameter() {
    let (url, mut accepted) = spawn_socket_server().await;
    let client = RealtimeClient::new(url, authed_session("tok en&1"), fast_policy());
    let mut events = client.subscribe();

    client.connect();
    let (token, _socket) = accept(&mut accepted).await;
    wait_for_state(&client, ConnectionState::Connected).await;

    assert_eq!(token, "tok en&1");
    assert!(client.is_connected());
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);
}

#[tokio::test]
async fn disconnect_closes_socket_and_is_idempotent() {
    let (url, mut accepted) = spawn_socket_server().await;
    let client = RealtimeClient::new(url, authed_session("abc"), fast_policy());
    let mut events = client.subscribe();

    client.connect();
    let (_, mut socket) = accept(&mut accepted).await;
    wait_for_state(&client, ConnectionState::Connected).await;
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);

    client.disconnect();
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Disconnected);

    let closed = tokio::time::timeout(WAIT, socket.recv()).await.expect("close timeout");
    assert!(matches!(closed, None | Some(Ok(WsMessage::Close(_)) | Err(_))));

    client.disconnect();
    assert!(!client.send_message(2, "late"));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn explicit_connect_replaces_running_connection() {
    let (url, mut accepted) = spawn_socket_server().await;
    let client = RealtimeClient::new(url, authed_session("abc"), fast_policy());
    let mut events = client.subscribe();

    client.connect();
    let (_, mut first) = accept(&mut accepted).await;
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);

    client.connect();
    let (_, mut second) = accept(&mut accepted).await;
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);

    let closed = tokio::time::timeout(WAIT, first.recv()).await.expect("close timeout");
    assert!(matches!(closed, None | Some(Ok(WsMessage::Close(_)) | Err(_))));

    assert!(client.send_typing(4, true));
    assert_eq!(received_json(&mut second).await, json!({"type": "typing", "receiver_id": 4, "is_typing": true}));
}

// =============================================================================
// SEND
// =============================================================================

#[tokio::test]
async fn send_while_never_connected_is_dropped() {
    let client = RealtimeClient::new(refused_url(), authed_session("abc"), fast_policy());

    assert!(!client.send_message(2, "hello"));
    assert!(!client.mark_messages_read(2));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn outbound_helpers_write_tagged_frames() {
    let (url, mut accepted) = spawn_socket_server().await;
    let client = RealtimeClient::new(url, authed_session("abc"), fast_policy());

    client.connect();
    let (_, mut socket) = accept(&mut accepted).await;
    wait_for_state(&client, ConnectionState::Connected).await;

    assert!(client.send_message(2, "hi bob"));
    assert!(client.mark_messages_read(2));

    assert_eq!(received_json(&mut socket).await, json!({"type": "message", "receiver_id": 2, "content": "hi bob"}));
    assert_eq!(received_json(&mut socket).await, json!({"type": "mark_read", "other_user_id": 2}));
}

// =============================================================================
// DISPATCH
// =============================================================================

#[tokio::test]
async fn inbound_frames_reach_typed_handler_and_malformed_ones_are_dropped() {
    let (url, mut accepted) = spawn_socket_server().await;
    let client = RealtimeClient::new(url, authed_session("abc"), fast_policy());
    let (tx, mut delivered) = mpsc::unbounded_channel();
    client.on_chat_message(move |message| {
        let _ = tx.send(message);
    });

    client.connect();
    let (_, mut socket) = accept(&mut accepted).await;

    push(&mut socket, "not json").await;
    push(&mut socket, r#"{"id": 1, "content": "no tag"}"#).await;
    push(&mut socket, r#"{"type": "message", "content": "missing ids"}"#).await;
    push(&mut socket, r#"{"type": "message", "id": 7, "content": "hi", "sender_id": 2, "receiver_id": 1}"#).await;

    let message = tokio::time::timeout(WAIT, delivered.recv()).await.expect("delivery").expect("handler");
    assert_eq!((message.id, message.content.as_str()), (7, "hi"));
    assert!(delivered.try_recv().is_err());
    assert!(client.is_connected());
}

#[tokio::test]
async fn registering_twice_keeps_only_the_second_handler() {
    let (url, mut accepted) = spawn_socket_server().await;
    let client = RealtimeClient::new(url, authed_session("abc"), fast_policy());
    let first_calls = Arc::new(AtomicUsize::new(0));
    let (tx, mut delivered) = mpsc::unbounded_channel();

    let counter = Arc::clone(&first_calls);
    assert!(!client.on_message("typing", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    assert!(client.on_typing(move |typing| {
        let _ = tx.send(typing);
    }));

    client.connect();
    let (_, mut socket) = accept(&mut accepted).await;
    push(&mut socket, r#"{"type": "typing", "sender_id": 3, "is_typing": true}"#).await;

    let typing = tokio::time::timeout(WAIT, delivered.recv()).await.expect("delivery").expect("handler");
    assert_eq!(typing.sender_id, 3);
    assert_eq!(first_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unhandled_kinds_are_ignored() {
    let (url, mut accepted) = spawn_socket_server().await;
    let client = RealtimeClient::new(url, authed_session("abc"), fast_policy());
    let (tx, mut delivered) = mpsc::unbounded_channel();
    client.on_user_status(move |status| {
        let _ = tx.send(status);
    });

    client.connect();
    let (_, mut socket) = accept(&mut accepted).await;
    push(&mut socket, r#"{"type": "online_users", "users": []}"#).await;
    push(&mut socket, r#"{"type": "user_status", "user_id": 5, "is_online": false}"#).await;

    let status = tokio::time::timeout(WAIT, delivered.recv()).await.expect("delivery").expect("handler");
    assert_eq!((status.user_id, status.is_online), (5, false));
}

// =============================================================================
// RECONNECT
// =============================================================================

#[tokio::test]
async fn server_close_reconnects_with_fresh_budget() {
    let (url, mut accepted) = spawn_socket_server().await;
    let client = RealtimeClient::new(url, authed_session("abc"), fast_policy());
    let mut events = client.subscribe();
    let delay = Duration::from_millis(50);

    client.connect();
    for _ in 0..2 {
        let (_, mut socket) = accept(&mut accepted).await;
        assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);

        socket.send(WsMessage::Close(None)).await.expect("close");
        drop(socket);

        assert_eq!(next_event(&mut events).await, ConnectionEvent::Disconnected);
        assert_eq!(next_event(&mut events).await, ConnectionEvent::ReconnectScheduled { attempt: 1, delay });
    }

    let _reopened = accept(&mut accepted).await;
    wait_for_state(&client, ConnectionState::Connected).await;
    client.disconnect();
}

#[tokio::test(start_paused = true)]
async fn failed_connects_back_off_linearly_then_stop_until_connect() {
    let client = RealtimeClient::new(refused_url(), authed_session("abc"), RetryPolicy::default());
    let mut events = client.subscribe();
    let started = tokio::time::Instant::now();

    client.connect();

    let mut delays = Vec::new();
    loop {
        match events.recv().await.expect("event") {
            ConnectionEvent::ReconnectScheduled { attempt, delay } => {
                assert_eq!(attempt as usize, delays.len() + 1);
                delays.push(delay.as_millis());
            }
            ConnectionEvent::Disconnected => {}
            ConnectionEvent::ReconnectsExhausted => break,
            ConnectionEvent::Connected => panic!("nothing is listening"),
        }
    }

    assert_eq!(delays, [3000, 6000, 9000, 12000, 15000]);
    assert!(started.elapsed() >= Duration::from_secs(45));
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let quiet = tokio::time::timeout(Duration::from_secs(120), events.recv()).await;
    assert!(quiet.is_err(), "no attempts after the budget is spent");

    client.connect();
    assert_eq!(events.recv().await.expect("event"), ConnectionEvent::Disconnected);
    assert_eq!(
        events.recv().await.expect("event"),
        ConnectionEvent::ReconnectScheduled { attempt: 1, delay: Duration::from_millis(3000) }
    );
    client.disconnect();
}

#[tokio::test]
async fn cleared_session_stops_reconnects() {
    let (url, mut accepted) = spawn_socket_server().await;
    let session = authed_session("abc");
    let client = RealtimeClient::new(url, session.clone(), fast_policy());
    let mut events = client.subscribe();

    client.connect();
    let (_, mut socket) = accept(&mut accepted).await;
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);

    session.clear_token().expect("clear");
    socket.send(WsMessage::Close(None)).await.expect("close");
    drop(socket);

    assert_eq!(next_event(&mut events).await, ConnectionEvent::Disconnected);
    let reopened = tokio::time::timeout(Duration::from_millis(500), accepted.recv()).await;
    assert!(reopened.is_err(), "reconnected without a token");
    assert!(events.try_recv().is_err());
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn session_cleared_during_backoff_cancels_the_pending_attempt() {
    let (url, mut accepted) = spawn_socket_server().await;
    let session = authed_session("abc");
    let policy = RetryPolicy { max_attempts: 3, backoff: Backoff::Fixed(Duration::from_millis(200)) };
    let client = RealtimeClient::new(url, session.clone(), policy);
    let mut events = client.subscribe();

    client.connect();
    let (_, mut socket) = accept(&mut accepted).await;
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);

    socket.send(WsMessage::Close(None)).await.expect("close");
    drop(socket);
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Disconnected);
    assert!(matches!(next_event(&mut events).await, ConnectionEvent::ReconnectScheduled { attempt: 1, .. }));

    session.clear_token().expect("clear");
    let reopened = tokio::time::timeout(Duration::from_millis(600), accepted.recv()).await;
    assert!(reopened.is_err(), "reconnected without a token");
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn never_policy_gives_up_after_first_failure() {
    let client = RealtimeClient::new(refused_url(), authed_session("abc"), RetryPolicy::never());
    let mut events = client.subscribe();

    client.connect();

    assert_eq!(next_event(&mut events).await, ConnectionEvent::Disconnected);
    assert_eq!(next_event(&mut events).await, ConnectionEvent::ReconnectsExhausted);
}

// =============================================================================
// STATE
// =============================================================================

#[test]
fn cancelled_link_cannot_write_state() {
    let shared = Shared::new();
    let mut events = shared.events.subscribe();
    let stale = CancellationToken::new();
    stale.cancel();

    assert!(!shared.transition_if_live(&stale, ConnectionState::Connecting, None));
    assert!(!shared.transition_if_live(&stale, ConnectionState::Connected, Some(ConnectionEvent::Connected)));
    assert_eq!(*shared.state.borrow(), ConnectionState::Disconnected);
    assert!(events.try_recv().is_err());

    let live = CancellationToken::new();
    assert!(shared.transition_if_live(&live, ConnectionState::Connected, Some(ConnectionEvent::Connected)));
    assert_eq!(events.try_recv().expect("event"), ConnectionEvent::Connected);
}

#[tokio::test]
async fn disconnect_while_connecting_settles_disconnected() {
    let client = RealtimeClient::new(refused_url(), authed_session("abc"), RetryPolicy::default());

    client.connect();
    client.disconnect();
    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(client.state(), ConnectionState::Disconnected);
}

// =============================================================================
// URL
// =============================================================================

#[test]
fn socket_url_appends_encoded_token() {
    let base = reqwest::Url::parse("ws://localhost:8000/ws").expect("url");
    assert_eq!(socket_url(base, "a b+c"), "ws://localhost:8000/ws?token=a+b%2Bc");

    let base = reqwest::Url::parse("wss://chat.example.test/ws?v=2").expect("url");
    assert_eq!(socket_url(base, "t"), "wss://chat.example.test/ws?v=2&token=t");
}
