//! Realtime socket client for chat, typing and presence events.
//!
//! ARCHITECTURE
//! ============
//! `connect()` spawns one supervisor task that owns the socket. The task
//! opens the connection, pumps inbound frames into the handler registry and
//! outbound frames from an unbounded channel, and on close schedules the next
//! attempt from the injected [`RetryPolicy`]. The attempt counter resets on
//! every successful open; once the budget is spent the task exits and nothing
//! happens until `connect()` is called again. The token is read from the
//! session before every attempt, and a cleared session ends the task.
//!
//! Delivery is best-effort: `send()` while no socket is open drops the frame,
//! malformed inbound frames are logged and dropped, and transport errors
//! never reach the caller.

mod dispatch;
mod retry;

pub use dispatch::{Handler, HandlerRegistry};
pub use retry::{Backoff, RetryPolicy};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use frames::{ChatMessage, EventKind, Frame, ReadReceipt, TypingIndicator, UserStatus};
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use crate::lock;
use crate::session::Session;

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const EVENT_CAPACITY: usize = 64;

/// Lifecycle of the socket as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Lifecycle notifications published to [`RealtimeClient::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
    /// Attempt `attempt` will start after `delay`.
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// The retry budget is spent; only an explicit `connect()` reopens.
    ReconnectsExhausted,
}

/// Handle to the realtime connection. Clones share the connection.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<Inner>,
}

struct Inner {
    ws_url: String,
    session: Session,
    policy: RetryPolicy,
    shared: Arc<Shared>,
    link: Mutex<Option<Link>>,
}

/// State touched by both the caller and the supervisor task.
struct Shared {
    handlers: Mutex<HandlerRegistry>,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<ConnectionEvent>,
}

/// Where the supervisor connects. The token is read from the session before
/// every attempt, so a cleared session stops reconnects.
struct Target {
    base: reqwest::Url,
    session: Session,
}

/// One `connect()` call's supervisor, as seen from the outside.
#[derive(Clone)]
struct Link {
    cancel: CancellationToken,
    outbound: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
}

#[derive(Debug, PartialEq, Eq)]
enum PumpExit {
    Closed,
    Cancelled,
}

impl RealtimeClient {
    /// Build a disconnected client for `ws_url`, authenticating with the
    /// token `session` holds at `connect()` time.
    #[must_use]
    pub fn new(ws_url: impl Into<String>, session: Session, policy: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                ws_url: ws_url.into(),
                session,
                policy,
                shared: Arc::new(Shared::new()),
                link: Mutex::new(None),
            }),
        }
    }

    /// Open the socket and keep it open, reconnecting per the retry policy.
    ///
    /// Does nothing (beyond logging) when no token is held. Replaces any
    /// connection started by an earlier call, with a fresh retry budget.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn connect(&self) {
        if !self.inner.session.is_authenticated() {
            tracing::error!("no token available for realtime connection");
            return;
        }
        let base = match reqwest::Url::parse(&self.inner.ws_url) {
            Ok(base) => base,
            Err(error) => {
                tracing::error!(%error, url = %self.inner.ws_url, "invalid realtime URL");
                return;
            }
        };

        let link = Link { cancel: CancellationToken::new(), outbound: Arc::new(Mutex::new(None)) };
        if let Some(previous) = lock(&self.inner.link).replace(link.clone()) {
            previous.cancel.cancel();
        }
        let target = Target { base, session: self.inner.session.clone() };
        tokio::spawn(supervise(Arc::clone(&self.inner.shared), self.inner.policy, target, link));
    }

    /// Close the socket and stop reconnecting. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let Some(link) = lock(&self.inner.link).take() else {
            return;
        };
        link.cancel.cancel();
        lock(&link.outbound).take();
        self.inner.shared.transition(ConnectionState::Disconnected, ConnectionEvent::Disconnected);
    }

    /// Transmit `frame` if the socket is open. Returns `false` when it was dropped.
    pub fn send(&self, frame: &Frame) -> bool {
        let link = lock(&self.inner.link);
        let outbound = link.as_ref().and_then(|link| lock(&link.outbound).clone());
        let Some(tx) = outbound else {
            tracing::debug!(kind = %frame.kind, "realtime socket not open; dropping frame");
            return false;
        };
        tx.send(frames::encode_frame(frame)).is_ok()
    }

    pub fn send_message(&self, receiver_id: i64, content: &str) -> bool {
        self.send(&frames::message_frame(receiver_id, content))
    }

    pub fn send_typing(&self, receiver_id: i64, is_typing: bool) -> bool {
        self.send(&frames::typing_frame(receiver_id, is_typing))
    }

    pub fn mark_messages_read(&self, other_user_id: i64) -> bool {
        self.send(&frames::mark_read_frame(other_user_id))
    }

    /// Register the handler for `kind`, replacing any previous one.
    /// Returns `true` if a handler was replaced.
    pub fn on_message(&self, kind: impl Into<EventKind>, handler: impl Fn(&Frame) + Send + Sync + 'static) -> bool {
        lock(&self.inner.shared.handlers).insert(kind.into(), Arc::new(handler))
    }

    pub fn remove_handler(&self, kind: impl Into<EventKind>) -> bool {
        lock(&self.inner.shared.handlers).remove(&kind.into())
    }

    pub fn on_chat_message(&self, handler: impl Fn(ChatMessage) + Send + Sync + 'static) -> bool {
        self.on_typed(EventKind::Message, handler)
    }

    pub fn on_typing(&self, handler: impl Fn(TypingIndicator) + Send + Sync + 'static) -> bool {
        self.on_typed(EventKind::Typing, handler)
    }

    pub fn on_message_read(&self, handler: impl Fn(ReadReceipt) + Send + Sync + 'static) -> bool {
        self.on_typed(EventKind::MessageRead, handler)
    }

    pub fn on_user_status(&self, handler: impl Fn(UserStatus) + Send + Sync + 'static) -> bool {
        self.on_typed(EventKind::UserStatus, handler)
    }

    fn on_typed<T: DeserializeOwned + 'static>(&self, kind: EventKind, handler: impl Fn(T) + Send + Sync + 'static) -> bool {
        self.on_message(kind, move |frame: &Frame| match frame.payload::<T>() {
            Ok(payload) => handler(payload),
            Err(error) => tracing::warn!(kind = %frame.kind, %error, "dropping realtime frame with unexpected payload"),
        })
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.shared.state.borrow()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.shared.state.subscribe()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.shared.events.subscribe()
    }
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("ws_url", &self.inner.ws_url)
            .field("state", &self.state())
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(link) = self.link.get_mut().ok().and_then(Option::take) {
            link.cancel.cancel();
        }
    }
}

impl Shared {
    fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { handlers: Mutex::new(HandlerRegistry::new()), state, events }
    }

    /// Move to `state`, publishing `event` only if the state actually changed.
    fn transition(&self, state: ConnectionState, event: ConnectionEvent) {
        let changed = self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            self.emit(event);
        }
    }

    /// Like [`Shared::transition`], but a no-op once `link` is cancelled.
    /// The cancellation check runs under the state lock. Returns whether the
    /// state changed.
    fn transition_if_live(&self, link: &CancellationToken, state: ConnectionState, event: Option<ConnectionEvent>) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if link.is_cancelled() || *current == state {
                return false;
            }
            *current = state;
            true
        });
        if changed && let Some(event) = event {
            self.emit(event);
        }
        changed
    }

    fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }

    fn dispatch(&self, text: &str) {
        let frame = match frames::decode_frame(text) {
            Ok(frame) => frame,
            Err(error) => {
                tracing::warn!(%error, "dropping malformed realtime frame");
                return;
            }
        };
        let handler = lock(&self.handlers).get(&frame.kind);
        match handler {
            Some(handler) => handler(&frame),
            None => tracing::debug!(kind = %frame.kind, "no handler for realtime frame"),
        }
    }
}

/// Connection loop for one `connect()` call.
async fn supervise(shared: Arc<Shared>, policy: RetryPolicy, target: Target, link: Link) {
    let mut attempts = 0_u32;

    loop {
        let Some(token) = target.session.token() else {
            tracing::warn!("session token cleared; stopping realtime reconnects");
            shared.transition_if_live(&link.cancel, ConnectionState::Disconnected, Some(ConnectionEvent::Disconnected));
            return;
        };
        let url = socket_url(target.base.clone(), &token);
        if link.cancel.is_cancelled() {
            return;
        }
        shared.transition_if_live(&link.cancel, ConnectionState::Connecting, None);

        let opened = tokio::select! {
            () = link.cancel.cancelled() => return,
            result = connect_async(url.as_str()) => result,
        };

        match opened {
            Ok((socket, _)) => {
                attempts = 0;
                tracing::info!("realtime socket connected");
                let (tx, rx) = mpsc::unbounded_channel();
                *lock(&link.outbound) = Some(tx);
                shared.transition_if_live(&link.cancel, ConnectionState::Connected, Some(ConnectionEvent::Connected));

                let exit = pump(&shared, socket, rx, &link.cancel).await;
                lock(&link.outbound).take();
                if exit == PumpExit::Cancelled {
                    return;
                }
                tracing::info!("realtime socket disconnected");
            }
            Err(error) => {
                tracing::warn!(%error, "realtime connect failed");
            }
        }

        if link.cancel.is_cancelled() {
            return;
        }
        shared.transition_if_live(&link.cancel, ConnectionState::Disconnected, Some(ConnectionEvent::Disconnected));
        if !target.session.is_authenticated() {
            tracing::warn!("session token cleared; not reconnecting");
            return;
        }

        let Some(delay) = policy.next_delay(attempts) else {
            tracing::warn!(max_attempts = policy.max_attempts, "realtime reconnect attempts exhausted");
            shared.emit(ConnectionEvent::ReconnectsExhausted);
            return;
        };
        attempts += 1;
        shared.emit(ConnectionEvent::ReconnectScheduled { attempt: attempts, delay });

        tokio::select! {
            () = link.cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }
        tracing::info!(attempt = attempts, max_attempts = policy.max_attempts, "attempting to reconnect");
    }
}

/// Shuttle frames until the socket closes or the link is cancelled.
async fn pump(
    shared: &Shared,
    socket: Socket,
    mut outbound: mpsc::UnboundedReceiver<String>,
    cancel: &CancellationToken,
) -> PumpExit {
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return PumpExit::Cancelled;
            }
            Some(text) = outbound.recv() => {
                if let Err(error) = write.send(Message::Text(text.into())).await {
                    tracing::warn!(%error, "realtime send failed");
                    return PumpExit::Closed;
                }
            }
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => shared.dispatch(text.as_str()),
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => shared.dispatch(text),
                    Err(error) => tracing::warn!(%error, "dropping non-UTF-8 realtime frame"),
                },
                Some(Ok(Message::Close(_))) | None => return PumpExit::Closed,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    tracing::warn!(%error, "realtime socket error");
                    return PumpExit::Closed;
                }
            },
        }
    }
}

/// `base` with the token appended as the `token` query parameter.
fn socket_url(mut base: reqwest::Url, token: &str) -> String {
    base.query_pairs_mut().append_pair("token", token);
    base.to_string()
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
