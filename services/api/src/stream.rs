//! WebSocket endpoint that relays the story generation stream.
//!
//! The relay state machine lives in `playground_core::relay`; this module
//! only moves its events onto the socket and maps terminal events to close
//! codes. Dropping the event receiver is how a client disconnect propagates
//! back to the relay.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::Response;
use playground_core::relay::{StreamEvent, stream_story};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::AppState;

/// **WS /api/v1/story/stream/{session_id}** - step 2 of the streaming
/// workflow.
///
/// Streaming begins immediately on connect:
/// - `{"type": "chunk", "content": "..."}` zero or more times,
/// - then exactly one of `{"type": "done", "story": {...}}` (close 1000) or
///   `{"type": "error", "detail": "..."}` (close 1011).
pub async fn story_stream(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, session_id: String) {
    info!(%session_id, "story stream connected");

    let (events_tx, mut events_rx) = mpsc::channel(32);
    let relay_state = state.clone();
    let relay_id = session_id.clone();
    let relay = tokio::spawn(async move {
        stream_story(
            &relay_state.sessions,
            &relay_id,
            &relay_state.generator,
            events_tx,
        )
        .await;
    });

    while let Some(event) = events_rx.recv().await {
        let close = match &event {
            StreamEvent::Chunk { .. } => None,
            StreamEvent::Done { .. } => Some(close_code::NORMAL),
            StreamEvent::Error { .. } => Some(close_code::ERROR),
        };

        let frame = match serde_json::to_string(&event) {
            Ok(frame) => frame,
            Err(e) => {
                error!(%session_id, "could not serialize stream event: {e}");
                break;
            }
        };
        if socket.send(Message::Text(frame.into())).await.is_err() {
            // Client went away mid-stream; dropping the receiver below
            // stops the relay.
            break;
        }

        if let Some(code) = close {
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code,
                    reason: "".into(),
                })))
                .await;
            break;
        }
    }

    drop(events_rx);
    let _ = relay.await;
    info!(%session_id, "story stream closed");
}
