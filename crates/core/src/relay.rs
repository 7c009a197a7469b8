//! The per-connection streaming state machine.
//!
//! One run per WebSocket connection: consume the one-shot session, drive the
//! generator in streaming mode, forward every fragment in arrival order while
//! accumulating the full text, then validate the accumulation as a complete
//! [`Story`]. Events leave through an mpsc channel; the service side owns the
//! socket, so a closed channel is the signal that the client disconnected.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::generator::StoryGenerator;
use crate::session::SessionStore;
use crate::story::Story;

/// How much raw model output a parse-failure diagnostic includes.
const RAW_PREVIEW_CHARS: usize = 500;

/// Outbound protocol events, one JSON text frame each.
///
/// A connection sees zero or more `chunk` events followed by exactly one
/// terminal event, unless the client disconnects first.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Chunk { content: String },
    Done { story: Story },
    Error { detail: String },
}

/// Runs one streaming connection to completion.
///
/// Every failure path emits a single `Error` event; a failed send on
/// `events` means the client vanished, which ends the run silently with no
/// terminal event. Nothing is retried here: sessions are one-shot, so a
/// retry is a fresh create-and-stream cycle.
pub async fn stream_story<G>(
    store: &SessionStore,
    session_id: &str,
    generator: &G,
    events: mpsc::Sender<StreamEvent>,
) where
    G: StoryGenerator + ?Sized,
{
    let Some(session) = store.consume(session_id).await else {
        let detail = format!(
            "Session '{session_id}' not found or has expired. \
             Please POST to /api/v1/story/start to create a new session."
        );
        let _ = events.send(StreamEvent::Error { detail }).await;
        return;
    };

    info!(%session_id, character = %session.character.name, "starting story stream");

    let mut fragments = match generator
        .generate_stream(
            &session.character,
            &session.material,
            &session.prompt,
            &session.user_name,
        )
        .await
    {
        Ok(fragments) => fragments,
        Err(e) => {
            warn!(%session_id, "stream handshake failed: {e}");
            let _ = events
                .send(StreamEvent::Error {
                    detail: e.to_string(),
                })
                .await;
            return;
        }
    };

    let mut accumulated = String::new();
    while let Some(fragment) = fragments.recv().await {
        match fragment {
            Ok(content) => {
                accumulated.push_str(&content);
                if events.send(StreamEvent::Chunk { content }).await.is_err() {
                    // Client disconnected mid-stream. Not an error.
                    return;
                }
            }
            Err(e) => {
                warn!(%session_id, "provider stream failed: {e}");
                let _ = events
                    .send(StreamEvent::Error {
                        detail: e.to_string(),
                    })
                    .await;
                return;
            }
        }
    }

    match serde_json::from_str::<Story>(&accumulated) {
        Ok(story) => {
            info!(%session_id, frames = story.frames.len(), "story stream complete");
            let _ = events.send(StreamEvent::Done { story }).await;
        }
        Err(e) => {
            warn!(%session_id, "accumulated output is not a valid story: {e}");
            let preview: String = accumulated.chars().take(RAW_PREVIEW_CHARS).collect();
            let detail = format!(
                "Failed to parse completed story JSON: {e}. \
                 Raw output (first {RAW_PREVIEW_CHARS} chars): {preview}"
            );
            let _ = events.send(StreamEvent::Error { detail }).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{FragmentResult, GeneratorError, MockStoryGenerator};
    use crate::story::{Character, FrameId};

    fn ada() -> Character {
        Character {
            name: "Ada".to_string(),
            description: "curious".to_string(),
            tone: "playful".to_string(),
        }
    }

    async fn store_with_session(id: &str) -> SessionStore {
        let store = SessionStore::new();
        store
            .create(
                id.to_string(),
                ada(),
                "Photosynthesis converts light into chemical energy.".to_string(),
                String::new(),
                String::new(),
            )
            .await;
        store
    }

    /// Builds a closed fragment channel pre-loaded with the given items, the
    /// way the real generator's reader task would fill it.
    fn fragment_stream(items: Vec<FragmentResult>) -> mpsc::Receiver<FragmentResult> {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            tx.try_send(item).expect("channel sized to fit");
        }
        rx
    }

    async fn collect_events<G: StoryGenerator>(
        store: &SessionStore,
        session_id: &str,
        generator: &G,
    ) -> Vec<StreamEvent> {
        let (tx, mut rx) = mpsc::channel(32);
        stream_story(store, session_id, generator, tx).await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn relays_fragments_in_order_then_emits_the_parsed_story() {
        let store = store_with_session("sid").await;

        // Three fragments that reassemble to exactly one valid story.
        let parts = [
            r#"{"title":"T","summary":"S","frames":[{"id":1,"#,
            r#""speaker":"Ada","text":"Hi","emotion":"happy","#,
            r#""nextFrameId":null}]}"#,
        ];
        let full: String = parts.concat();

        let mut generator = MockStoryGenerator::new();
        generator
            .expect_generate_stream()
            .withf(|character, material, _, _| {
                character.name == "Ada" && material.contains("Photosynthesis")
            })
            .returning(move |_, _, _, _| {
                let rx =
                    fragment_stream(parts.iter().map(|p| Ok((*p).to_string())).collect());
                Box::pin(async move { Ok(rx) })
            })
            .once();

        let events = collect_events(&store, "sid", &generator).await;

        assert_eq!(events.len(), 4);
        for (event, part) in events.iter().zip(parts) {
            match event {
                StreamEvent::Chunk { content } => assert_eq!(content.as_str(), part),
                other => panic!("expected chunk, got {other:?}"),
            }
        }
        match &events[3] {
            StreamEvent::Done { story } => {
                // The streamed story deep-equals a direct parse of the text.
                assert_eq!(*story, serde_json::from_str::<Story>(&full).unwrap());
                assert_eq!(story.frames.len(), 1);
                assert_eq!(story.frames[0].id, FrameId::Num(1));
                assert_eq!(story.frames[0].next_frame_id, None);
            }
            other => panic!("expected done, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_session_gets_one_error_and_no_chunks() {
        let store = SessionStore::new();
        // No expectations: the generator must never be invoked.
        let generator = MockStoryGenerator::new();

        let events = collect_events(&store, "never-created", &generator).await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Error { detail } => {
                assert!(detail.contains("not found or has expired"), "got: {detail}");
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparseable_accumulation_yields_exactly_one_error() {
        let store = store_with_session("sid").await;

        let mut generator = MockStoryGenerator::new();
        generator.expect_generate_stream().returning(|_, _, _, _| {
            let rx = fragment_stream(vec![
                Ok("this is ".to_string()),
                Ok("not json".to_string()),
            ]);
            Box::pin(async move { Ok(rx) })
        });

        let events = collect_events(&store, "sid", &generator).await;

        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], StreamEvent::Chunk { .. }));
        assert!(matches!(events[1], StreamEvent::Chunk { .. }));
        match &events[2] {
            StreamEvent::Error { detail } => {
                assert!(detail.contains("Failed to parse completed story JSON"));
                assert!(detail.contains("this is not json"));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn handshake_failure_surfaces_as_a_single_error() {
        let store = store_with_session("sid").await;

        let mut generator = MockStoryGenerator::new();
        generator
            .expect_generate_stream()
            .returning(|_, _, _, _| Box::pin(async { Err(GeneratorError::Unconfigured) }));

        let events = collect_events(&store, "sid", &generator).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Error { .. }));
    }

    #[tokio::test]
    async fn mid_stream_transport_failure_ends_with_an_error_not_a_done() {
        let store = store_with_session("sid").await;

        let mut generator = MockStoryGenerator::new();
        generator.expect_generate_stream().returning(|_, _, _, _| {
            let rx = fragment_stream(vec![
                Ok("{\"title\"".to_string()),
                Err(GeneratorError::Provider {
                    status: 502,
                    body: "bad gateway".to_string(),
                }),
            ]);
            Box::pin(async move { Ok(rx) })
        });

        let events = collect_events(&store, "sid", &generator).await;

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], StreamEvent::Chunk { .. }));
        match &events[1] {
            StreamEvent::Error { detail } => assert!(detail.contains("502")),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn client_disconnect_aborts_silently() {
        let store = store_with_session("sid").await;

        let mut generator = MockStoryGenerator::new();
        generator
            .expect_generate_stream()
            .returning(|_, _, _, _| {
                let rx = fragment_stream(vec![Ok("{".to_string()), Ok("}".to_string())]);
                Box::pin(async move { Ok(rx) })
            })
            .once();

        let (tx, rx) = mpsc::channel(1);
        drop(rx); // Client gone before the first chunk.

        // Must return without panicking; the session is still consumed.
        stream_story(&store, "sid", &generator, tx).await;
        assert!(store.consume("sid").await.is_none());
    }

    #[test]
    fn events_serialize_to_the_wire_format() {
        let chunk = StreamEvent::Chunk {
            content: "hi".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&chunk).unwrap(),
            serde_json::json!({"type": "chunk", "content": "hi"})
        );

        let error = StreamEvent::Error {
            detail: "boom".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            serde_json::json!({"type": "error", "detail": "boom"})
        );

        let story: Story = serde_json::from_str(
            r#"{"title":"T","summary":"S","frames":[{"id":1,"speaker":"A","text":"t","emotion":"neutral","nextFrameId":null}]}"#,
        )
        .unwrap();
        let done = serde_json::to_value(StreamEvent::Done { story }).unwrap();
        assert_eq!(done["type"], "done");
        assert_eq!(done["story"]["frames"][0]["id"], 1);
        assert_eq!(done["story"]["frames"][0]["nextFrameId"], serde_json::Value::Null);
    }
}
