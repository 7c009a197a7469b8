//! Text-to-speech relay over WebSocket, backed by Murf's streaming endpoint.
//!
//! Unrelated to the story pipeline: each text message from the client is
//! synthesized independently and streamed back as binary MP3 frames. A
//! failed utterance reports an error text frame and leaves the socket open
//! for the next one.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::StreamExt;
use tracing::{info, warn};

use crate::AppState;

const MURF_STREAM_URL: &str = "https://global.api.murf.ai/v1/speech/stream";
const MURF_TIMEOUT: Duration = Duration::from_secs(30);

/// **WS /api/v1/voice/stream** - send text, receive MP3 bytes.
pub async fn voice_stream(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    info!("voice stream connected");

    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(data) = message else {
            continue;
        };
        let text = extract_utterance(&data);
        if text.trim().is_empty() {
            continue;
        }

        if let Err(e) = relay_speech(&mut socket, &state, &text).await {
            warn!("voice synthesis failed: {e:#}");
            let frame =
                serde_json::json!({ "type": "error", "error": e.to_string() }).to_string();
            if socket.send(Message::Text(frame.into())).await.is_err() {
                return;
            }
        }
    }
}

/// Accepts either a bare utterance or `{"text": "..."}`.
fn extract_utterance(data: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(data) {
        Ok(value) => value
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string(),
        Err(_) => data.to_string(),
    }
}

async fn relay_speech(socket: &mut WebSocket, state: &Arc<AppState>, text: &str) -> Result<()> {
    let api_key = state
        .config
        .murf_api_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| anyhow!("MURF_API_KEY is not configured"))?;

    let payload = serde_json::json!({
        "voice_id": "en-US-elvira",
        "text": text,
        "multi_native_locale": "en-US",
        "model": "FALCON",
        "format": "MP3",
        "sampleRate": 24000,
        "channelType": "MONO",
        "style": "Narration",
    });

    let response = state
        .http
        .post(MURF_STREAM_URL)
        .header("api-key", api_key)
        .timeout(MURF_TIMEOUT)
        .json(&payload)
        .send()
        .await
        .context("could not reach Murf")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!("Murf API error {status}: {body}"));
    }

    let mut audio = response.bytes_stream();
    while let Some(chunk) = audio.next().await {
        let chunk = chunk.context("Murf stream interrupted")?;
        if chunk.is_empty() {
            continue;
        }
        if socket.send(Message::Binary(chunk)).await.is_err() {
            // Client disconnected mid-utterance.
            break;
        }
    }

    Ok(())
}
