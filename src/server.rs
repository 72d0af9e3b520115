//! The WebSocket side of the relay.
//!
//! A single route, `GET /ws?token=<hex>`, gated by the session token and by a
//! one-connection slot. Each accepted socket gets a read loop that feeds the
//! switchboard; the switchboard owns the write half and is the only writer.

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{stream::StreamExt, Sink};
use std::{
    collections::HashMap,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

const EVENT_QUEUE_DEPTH: usize = 64;

pub type ConnectionId = u64;
/// Write half of a connected client. Only the switchboard writes to it.
pub type SocketSink = Pin<Box<dyn Sink<Message, Error = axum::Error> + Send>>;

/// What the socket side reports to the switchboard.
pub enum SocketEvent {
    /// A client finished the upgrade. Dropping `closer` ends its read loop.
    Connected {
        id: ConnectionId,
        sink: SocketSink,
        closer: oneshot::Sender<()>,
    },
    Message { id: ConnectionId, text: String },
    Disconnected { id: ConnectionId },
}

/// Single-occupancy guard for socket clients.
///
/// `try_acquire` is the only place the occupied state changes hands; the
/// returned guard frees the slot when dropped.
#[derive(Clone, Debug, Default)]
pub struct ConnectionSlot {
    live: Arc<AtomicUsize>,
    allow_concurrent: bool,
}

#[derive(Debug)]
pub struct SlotGuard {
    live: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    pub fn new(allow_concurrent: bool) -> Self {
        Self {
            live: Arc::new(AtomicUsize::new(0)),
            allow_concurrent,
        }
    }

    pub fn try_acquire(&self) -> Option<SlotGuard> {
        if self.allow_concurrent {
            self.live.fetch_add(1, Ordering::AcqRel);
        } else if self
            .live
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        Some(SlotGuard {
            live: Arc::clone(&self.live),
        })
    }

    pub fn is_occupied(&self) -> bool {
        self.live.load(Ordering::Acquire) > 0
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

struct EndpointState {
    token: String,
    slot: ConnectionSlot,
    events: mpsc::Sender<SocketEvent>,
    next_id: AtomicU64,
}

/// Router plus the queue the switchboard consumes.
pub struct SocketEndpoint {
    router: Router,
}

impl SocketEndpoint {
    pub fn new(token: String, allow_concurrent: bool) -> (Self, mpsc::Receiver<SocketEvent>) {
        let (events, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let slot = ConnectionSlot::new(allow_concurrent);
        let state = Arc::new(EndpointState {
            token,
            slot,
            events,
            next_id: AtomicU64::new(1),
        });
        let router = Router::new()
            .route("/ws", get(ws_handler))
            .with_state(state);
        (Self { router }, rx)
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}

async fn ws_handler(
    State(state): State<Arc<EndpointState>>,
    Query(params): Query<HashMap<String, String>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let presented = params.get("token").map(String::as_str).unwrap_or_default();
    if !token_matches(&state.token, presented) {
        warn!("rejected connection with bad token");
        return (StatusCode::FORBIDDEN, "invalid token").into_response();
    }
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };
    // A busy slot is answered before the upgrade, as plain HTTP 400.
    let Some(guard) = state.slot.try_acquire() else {
        warn!("rejected connection: client already connected");
        return (StatusCode::BAD_REQUEST, "client already connected").into_response();
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state, guard))
}

/// Compare tokens in time independent of where they first differ.
fn token_matches(expected: &str, presented: &str) -> bool {
    let (a, b) = (expected.as_bytes(), presented.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

async fn handle_socket(socket: WebSocket, state: Arc<EndpointState>, guard: SlotGuard) {
    let id = state.next_id.fetch_add(1, Ordering::Relaxed);
    info!(connection = id, "websocket client connected");

    let (sink, mut stream) = socket.split();
    let (closer, mut closed) = oneshot::channel::<()>();
    if state
        .events
        .send(SocketEvent::Connected {
            id,
            sink: Box::pin(sink),
            closer,
        })
        .await
        .is_err()
    {
        return;
    }

    loop {
        let text = tokio::select! {
            _ = &mut closed => {
                debug!(connection = id, "connection closed by relay");
                break;
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(connection = id, error = %e, "dropping non-UTF-8 binary message");
                        continue;
                    }
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!(connection = id, error = %e, "websocket receive failed");
                    break;
                }
            },
        };
        if state
            .events
            .send(SocketEvent::Message { id, text })
            .await
            .is_err()
        {
            break;
        }
    }

    drop(guard);
    info!(connection = id, "websocket client disconnected");
    let _ = state.events.send(SocketEvent::Disconnected { id }).await;
}
