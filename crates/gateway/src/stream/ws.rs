//! WebSocket endpoint for streaming clients and dashboards.
//!
//! Flow:
//! 1. Client connects to `/ws/<session_id>` (or `/ws` for a generated id)
//! 2. The hub registers the connection and binds an `idle` session to it
//! 3. Reader loop: each text frame is handed to the hub, in order
//! 4. Writer task: drains the connection's outbound channel to the socket
//! 5. On close, error, or idle timeout: hub cleanup, writer aborted
//!
//! The idle timeout counts traffic in both directions, so a dashboard that
//! only receives broadcasts is not idle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use sp_protocol::ServerMessage;
use tokio::sync::mpsc;

use crate::state::AppState;

const MAX_SESSION_ID_LEN: usize = 128;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// GET /ws/:session_id: Upgrade to WebSocket for a caller-chosen session.
pub async fn stream_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    if !valid_session_id(&session_id) {
        return (StatusCode::BAD_REQUEST, "invalid session id").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
        .into_response()
}

/// GET /ws: Upgrade to WebSocket with a server-generated session id.
pub async fn stream_ws_generated(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let session_id = uuid::Uuid::new_v4().to_string();
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

fn valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Socket handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn handle_socket(socket: WebSocket, state: AppState, session_id: String) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    let streaming = &state.config.streaming;
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(streaming.outbound_buffer.max(1));
    let idle_timeout = streaming.idle_timeout_secs.map(Duration::from_secs);

    let hub = state.hub.clone();
    let handle = hub.connect(&session_id, outbound_tx);

    // Writer task: forwards outbound channel messages to the WS sink.  When
    // the socket rejects a send the task ends, the channel closes, and the
    // hub's next send to this connection tears it down.
    let activity = Arc::new(Activity::new());
    let writer_conn = handle.connection;
    let writer_activity = activity.clone();
    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = send_ws_message(&mut ws_sink, &msg).await {
                tracing::debug!(connection = %writer_conn, error = %e, "websocket send failed");
                break;
            }
            writer_activity.touch();
        }
    });

    // Reader loop: one frame at a time keeps per-session ordering.
    loop {
        let next = match idle_timeout {
            Some(limit) => match tokio::time::timeout(activity.remaining(limit), ws_stream.next()).await {
                Ok(next) => next,
                // Outbound traffic moved the deadline while we waited.
                Err(_) if activity.remaining(limit) > Duration::ZERO => continue,
                Err(_) => {
                    tracing::info!(
                        session_id = %handle.session_id,
                        connection = %handle.connection,
                        idle_secs = limit.as_secs(),
                        "closing idle connection"
                    );
                    break;
                }
            },
            None => ws_stream.next().await,
        };

        activity.touch();
        match next {
            Some(Ok(Message::Text(text))) => hub.handle_frame(&handle, &text),
            Some(Ok(Message::Binary(_))) => {
                tracing::debug!(connection = %handle.connection, "ignoring binary frame");
            }
            // axum answers WS-level pings itself.
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => {
                tracing::debug!(connection = %handle.connection, error = %e, "websocket receive failed");
                break;
            }
        }
    }

    hub.disconnect(&handle);
    writer.abort();
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Time of the last frame sent or received on a connection.
struct Activity {
    last: Mutex<Instant>,
}

impl Activity {
    fn new() -> Self {
        Self::since(Instant::now())
    }

    fn since(at: Instant) -> Self {
        Self {
            last: Mutex::new(at),
        }
    }

    fn touch(&self) {
        *self.last.lock() = Instant::now();
    }

    /// Time left before the connection counts as idle.
    fn remaining(&self, limit: Duration) -> Duration {
        limit.saturating_sub(self.last.lock().elapsed())
    }
}

async fn send_ws_message<S>(sink: &mut S, msg: &ServerMessage) -> anyhow::Result<()>
where
    S: SinkExt<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let json = serde_json::to_string(msg)?;
    sink.send(Message::Text(json)).await?;
    Ok(())
}
