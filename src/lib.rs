//! Vox Gateway - offline voice-control gateway
//!
//! This library provides the core functionality for the Vox gateway:
//! - Keyword intent routing for Spanish robot commands
//! - Sentence-streamed speech synthesis for a voice assistant
//! - Bounded, persisted conversation history per pipeline
//! - A shared model engine with one generation at a time
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  HTTP API (axum)                     │
//! │     /health   │   /robot/*   │   /assistant/*        │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                   Pipelines                          │
//! │  Router  │  Conversation logs  │  Segmenter + TTS   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │          Engine (generation gate)                    │
//! │      STT server  │  LLM server  │  TTS server        │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod error;
pub mod history;
pub mod pipelines;
pub mod router;
pub mod voice;

pub use config::Config;
pub use daemon::Daemon;
pub use engine::{ChatMessage, Engine, LanguageModel, Role, Synthesizer, Transcriber};
pub use error::{Error, Result};
pub use history::{ConversationLog, ConversationStore, HistoryDocument};
pub use router::{Action, ActionKind, ParamValue, RouteResult};
