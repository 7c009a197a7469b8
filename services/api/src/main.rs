//! Paper Playground API.
//!
//! Transforms uploaded study material into interactive visual-novel stories,
//! streamed token-by-token to the client over a WebSocket.
//!
//! Endpoints:
//! - `POST /api/v1/story/start` - upload material, get a `session_id`
//! - `GET  /api/v1/story/stream/{session_id}` - WebSocket story stream
//! - `POST /api/v1/story/generate` - blocking one-shot generation
//! - `GET  /api/v1/voice/stream` - WebSocket text-to-speech relay
//! - `GET  /`, `GET /health` - liveness

mod config;
mod error;
mod extract;
mod story;
mod stream;
mod voice;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::{Json, Router};
use playground_core::generator::OpenRouterGenerator;
use playground_core::session::SessionStore;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;

/// How often abandoned sessions get pruned from the store.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared state behind every handler.
pub struct AppState {
    pub config: Config,
    pub sessions: SessionStore,
    pub generator: OpenRouterGenerator,
    /// Plain client for the voice relay; the generator owns its own.
    pub http: reqwest::Client,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    let bind_address = config.bind_address;
    let generator = OpenRouterGenerator::new(
        config.openrouter_api_key.clone(),
        config.openrouter_model.clone(),
    );
    let state = Arc::new(AppState {
        config,
        sessions: SessionStore::new(),
        generator,
        http: reqwest::Client::new(),
    });

    // Bound memory for sessions that were created but never streamed.
    let sweeper = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            sweeper.sessions.sweep_expired().await;
        }
    });

    // Permissive CORS so a separately served frontend can call the API.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/v1/story/start", post(story::start_story))
        .route("/api/v1/story/generate", post(story::generate_story))
        .route("/api/v1/story/stream/{session_id}", get(stream::story_stream))
        .route("/api/v1/voice/stream", get(voice::voice_stream))
        .layer(cors)
        .with_state(state);

    info!("Paper Playground API listening on {}", bind_address);
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
