//! Client for the OpenRouter chat-completions API.
//!
//! The [`StoryGenerator`] trait is the seam between the relay and the
//! provider, so the streaming protocol can be tested against a mock without
//! network calls. [`OpenRouterGenerator`] is the real implementation, in
//! blocking form for the REST endpoint and streaming form for the WebSocket.

use async_trait::async_trait;
use futures_util::StreamExt;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::prompt;
use crate::story::{Character, Story};

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Timeout for the single-shot REST call.
const BLOCKING_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);
/// Timeout covering the whole streaming response.
const STREAMING_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(120);

const FRAGMENT_CHANNEL_CAPACITY: usize = 128;

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("OPEN_ROUTER_API_KEY is not configured in the environment")]
    Unconfigured,
    #[error("could not reach OpenRouter: {0}")]
    Unreachable(#[from] reqwest::Error),
    #[error("OpenRouter error {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("failed to parse AI response: {0}")]
    Malformed(String),
}

/// One fragment of generated text, or the transport failure that ended the
/// stream early.
pub type FragmentResult = Result<String, GeneratorError>;

#[async_trait]
#[cfg_attr(test, automock)]
pub trait StoryGenerator: Send + Sync {
    /// Sends one non-streaming request and parses the full payload as a
    /// [`Story`].
    async fn generate(
        &self,
        character: &Character,
        material: &str,
        prompt: &str,
        user_name: &str,
    ) -> Result<Story, GeneratorError>;

    /// Opens a streaming request and returns a finite, non-restartable
    /// sequence of non-empty text fragments in arrival order. Fails before
    /// the first fragment on a missing credential or a non-success
    /// handshake; transport failures after that arrive in-band.
    async fn generate_stream(
        &self,
        character: &Character,
        material: &str,
        prompt: &str,
        user_name: &str,
    ) -> Result<mpsc::Receiver<FragmentResult>, GeneratorError>;
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// A semantically meaningful line from the provider's SSE stream.
#[derive(Debug, PartialEq)]
enum SseLine {
    Delta(String),
    Done,
}

/// Parses one SSE line: `data: {json}` carrying a content delta, or the
/// `data: [DONE]` sentinel. Blank, keep-alive and malformed lines map to
/// `None` and are dropped rather than aborting the stream; the accumulated
/// text is validated as a whole afterwards anyway.
fn parse_sse_line(line: &str) -> Option<SseLine> {
    let raw = line.trim().strip_prefix("data:")?.trim();
    if raw == "[DONE]" {
        return Some(SseLine::Done);
    }
    let chunk: serde_json::Value = serde_json::from_str(raw).ok()?;
    let delta = chunk
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()?;
    if delta.is_empty() {
        None
    } else {
        Some(SseLine::Delta(delta.to_string()))
    }
}

pub struct OpenRouterGenerator {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl OpenRouterGenerator {
    pub fn new(api_key: Option<String>, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }

    fn credential(&self) -> Result<&str, GeneratorError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(GeneratorError::Unconfigured)
    }

    fn request_body(
        &self,
        character: &Character,
        material: &str,
        prompt: &str,
        user_name: &str,
        stream: bool,
    ) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": prompt::SYSTEM_PROMPT },
                { "role": "user", "content": prompt::build_user_message(character, material, prompt, user_name) },
            ],
            "temperature": 0.8,
            "response_format": { "type": "json_object" },
            "stream": stream,
        })
    }

    async fn post(
        &self,
        body: &serde_json::Value,
        timeout: std::time::Duration,
    ) -> Result<reqwest::Response, GeneratorError> {
        let api_key = self.credential()?;
        let response = self
            .client
            .post(format!("{OPENROUTER_BASE_URL}/chat/completions"))
            .bearer_auth(api_key)
            .header("HTTP-Referer", "http://localhost:8000")
            .header("X-Title", "Paper Playground")
            .timeout(timeout)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // Read the full error body before failing so the detail is useful.
            let body = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Provider {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl StoryGenerator for OpenRouterGenerator {
    async fn generate(
        &self,
        character: &Character,
        material: &str,
        prompt: &str,
        user_name: &str,
    ) -> Result<Story, GeneratorError> {
        let body = self.request_body(character, material, prompt, user_name, false);
        let response = self.post(&body, BLOCKING_TIMEOUT).await?;

        let data: ChatResponse = response
            .json()
            .await
            .map_err(|e| GeneratorError::Malformed(e.to_string()))?;
        let content = data
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| GeneratorError::Malformed("no choices in response".to_string()))?;

        serde_json::from_str::<Story>(content).map_err(|e| {
            let preview: String = content.chars().take(500).collect();
            GeneratorError::Malformed(format!("{e}. Raw: {preview}"))
        })
    }

    async fn generate_stream(
        &self,
        character: &Character,
        material: &str,
        prompt: &str,
        user_name: &str,
    ) -> Result<mpsc::Receiver<FragmentResult>, GeneratorError> {
        let body = self.request_body(character, material, prompt, user_name, true);
        let response = self.post(&body, STREAMING_TIMEOUT).await?;

        let (tx, rx) = mpsc::channel(FRAGMENT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            // Raw byte buffer so multi-byte characters split across network
            // chunks reassemble before decoding.
            let mut pending: Vec<u8> = Vec::new();

            while let Some(next) = stream.next().await {
                let bytes = match next {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(Err(GeneratorError::Unreachable(e))).await;
                        return;
                    }
                };
                pending.extend_from_slice(&bytes);

                while let Some(newline) = pending.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = pending.drain(..=newline).collect();
                    let line = String::from_utf8_lossy(&line);
                    match parse_sse_line(&line) {
                        Some(SseLine::Delta(delta)) => {
                            if tx.send(Ok(delta)).await.is_err() {
                                // Receiver dropped: the client is gone.
                                return;
                            }
                        }
                        Some(SseLine::Done) => return,
                        None => {}
                    }
                }
            }
            tracing::debug!("provider stream ended without a [DONE] sentinel");
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_content_delta_line() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(
            parse_sse_line(line),
            Some(SseLine::Delta("Hello".to_string()))
        );
    }

    #[test]
    fn recognizes_the_done_sentinel() {
        assert_eq!(parse_sse_line("data: [DONE]"), Some(SseLine::Done));
        assert_eq!(parse_sse_line("  data:[DONE]  "), Some(SseLine::Done));
    }

    #[test]
    fn drops_noise_lines_silently() {
        assert_eq!(parse_sse_line(""), None);
        assert_eq!(parse_sse_line(": keep-alive"), None);
        assert_eq!(parse_sse_line("data: {not json"), None);
        // Role-only delta with no content payload.
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            None
        );
        // Empty deltas carry no semantic payload either.
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":""}}]}"#),
            None
        );
    }

    // Live integration test against the real OpenRouter API. Ignored by
    // default so `cargo test` runs without a key; use `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn generates_a_story_against_the_live_api() {
        dotenvy::dotenv_override().ok();
        let api_key =
            std::env::var("OPEN_ROUTER_API_KEY").expect("OPEN_ROUTER_API_KEY not set");
        let generator =
            OpenRouterGenerator::new(Some(api_key), "openai/gpt-4o-mini".to_string());

        let character = Character {
            name: "Ada".to_string(),
            description: "curious".to_string(),
            tone: "playful".to_string(),
        };
        let story = generator
            .generate(
                &character,
                "Photosynthesis converts light into chemical energy.",
                "",
                "",
            )
            .await
            .expect("generation should succeed");

        assert!(!story.title.is_empty());
        assert!(!story.frames.is_empty());
    }

    #[tokio::test]
    async fn missing_credential_fails_before_any_request() {
        let generator = OpenRouterGenerator::new(None, "openai/gpt-4o-mini".to_string());
        let character = Character {
            name: "Ada".to_string(),
            description: "curious".to_string(),
            tone: "playful".to_string(),
        };

        let err = generator
            .generate_stream(&character, "material", "", "")
            .await
            .expect_err("should fail without a key");
        assert!(matches!(err, GeneratorError::Unconfigured));
    }
}
