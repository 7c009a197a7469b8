//! Core pipeline for turning uploaded study material into an interactive,
//! token-streamed visual novel story.
//!
//! This crate owns the pieces with real state-machine and concurrency
//! concerns: the one-shot [`session::SessionStore`] bridging the upload step
//! and the WebSocket step, the OpenRouter [`generator`] in blocking and
//! streaming form, the per-connection [`relay`] state machine, and the
//! validated [`story`] document model. HTTP routing, file extraction and the
//! voice relay live in the `playground-api` service crate.

pub mod generator;
pub mod prompt;
pub mod relay;
pub mod session;
pub mod story;
