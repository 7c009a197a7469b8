//! REST endpoints for the story workflow.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Multipart, State};
use playground_core::generator::StoryGenerator;
use playground_core::story::{Character, Story};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::extract_text;

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub session_id: String,
}

/// The multipart form shared by both story endpoints: `character` (a JSON
/// string), `file`, and optional `prompt` / `user_name` text fields.
struct StoryForm {
    character: Character,
    material: String,
    prompt: String,
    user_name: String,
}

fn parse_character(raw: &str) -> Result<Character, ApiError> {
    serde_json::from_str(raw)
        .map_err(|e| ApiError::unprocessable(format!("Invalid 'character' JSON: {e}")))
}

async fn read_form(mut multipart: Multipart) -> Result<StoryForm, ApiError> {
    let mut character_json: Option<String> = None;
    let mut file: Option<(String, String, bytes::Bytes)> = None;
    let mut prompt = String::new();
    let mut user_name = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart payload: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "character" => {
                character_json = Some(read_text_field(field, "character").await?);
            }
            "prompt" => prompt = read_text_field(field, "prompt").await?,
            "user_name" => user_name = read_text_field(field, "user_name").await?,
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Could not read upload: {e}")))?;
                file = Some((filename, content_type, data));
            }
            _ => {}
        }
    }

    let character_json =
        character_json.ok_or_else(|| ApiError::unprocessable("Missing 'character' form field."))?;
    let character = parse_character(&character_json)?;

    let (filename, content_type, data) =
        file.ok_or_else(|| ApiError::bad_request("Missing 'file' form field."))?;
    let material = extract_text(&data, &filename, &content_type)?;
    if material.trim().is_empty() {
        return Err(ApiError::bad_request(
            "Uploaded file appears to be empty or unreadable.",
        ));
    }

    Ok(StoryForm {
        character,
        material,
        prompt,
        user_name,
    })
}

async fn read_text_field(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("Could not read '{name}' field: {e}")))
}

/// **POST /api/v1/story/start** - step 1 of the streaming workflow.
///
/// Uploads the study material, stores everything in a one-shot session, and
/// returns the `session_id` the WebSocket step consumes. The session expires
/// after five minutes if unused.
pub async fn start_story(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<StartResponse>, ApiError> {
    let form = read_form(multipart).await?;

    let session_id = Uuid::new_v4().to_string();
    state
        .sessions
        .create(
            session_id.clone(),
            form.character,
            form.material,
            form.prompt,
            form.user_name,
        )
        .await;

    info!(%session_id, "created story session");
    Ok(Json(StartResponse { session_id }))
}

/// **POST /api/v1/story/generate** - single blocking request returning the
/// full story. Use `/start` plus the WebSocket for a streaming experience.
pub async fn generate_story(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<Story>, ApiError> {
    let form = read_form(multipart).await?;

    let story = state
        .generator
        .generate(&form.character, &form.material, &form.prompt, &form.user_name)
        .await?;

    Ok(Json(story))
}
