use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use tandem_core::types::DbId;

use crate::error::AppResult;
use crate::state::AppState;

/// HTTP handler that upgrades `GET /sessions/{id}/ws` to a WebSocket.
///
/// No authentication: participants are typically anonymous viewers. The
/// session must exist (404 otherwise); viewers may attach to an ended
/// session and will simply receive no further events.
pub async fn session_ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<DbId>,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let session = state.live.session(session_id).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, session_id, session)))
}

/// Manage a single viewer connection after upgrade.
///
/// 1. Registers the connection with `WsManager`.
/// 2. Sends a snapshot of the current session row as the first frame.
/// 3. Spawns a sender task (manager channel -> sink) and a feed task
///    (session subscription -> manager channel).
/// 4. Processes inbound frames on the current task and cleans up on
///    disconnect.
///
/// Each connection holds exactly one feed subscription, created here; a
/// client that reconnects gets a fresh registration, never a second
/// delivery path on the old one.
async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    session_id: DbId,
    session: tandem_db::models::live_session::LiveSession,
) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, session_id, "Viewer connected");

    let (tx, mut rx) = state.ws_manager.add(conn_id.clone(), session_id).await;
    let mut subscription = state.feed.subscribe(session_id);

    // Snapshot first, so the viewer renders current state before the first
    // change event arrives.
    match serde_json::to_string(&serde_json::json!({ "kind": "snapshot", "session": session })) {
        Ok(text) => {
            let _ = tx.send(Message::Text(text.into()));
        }
        Err(e) => tracing::error!(error = %e, "Failed to serialize session snapshot"),
    }

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel messages to the WebSocket sink.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    // Feed task: forward session change events as JSON text frames.
    let feed_tx = tx.clone();
    let feed_task = tokio::spawn(async move {
        while let Some(event) = subscription.next().await {
            match serde_json::to_string(&event) {
                Ok(text) => {
                    if feed_tx.send(Message::Text(text.into())).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!(error = %e, "Failed to serialize session event"),
            }
        }
        // Feed closed (server shutting down): tell the client to go away.
        let _ = feed_tx.send(Message::Close(None));
    });

    // Receiver loop: viewers only send control frames.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_msg) => {
                // Viewer connections are read-only; data frames are ignored.
            }
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    // Clean up: remove connection and stop both side tasks.
    state.ws_manager.remove(&conn_id).await;
    send_task.abort();
    feed_task.abort();
    tracing::info!(conn_id = %conn_id, session_id, "Viewer disconnected");
}
