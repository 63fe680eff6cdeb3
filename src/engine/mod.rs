//! Shared model engine
//!
//! One speech recognizer, one language model and an optional synthesizer are
//! loaded once and shared by every pipeline. Model calls are blocking and run
//! on the blocking thread pool; every language-model call, including the
//! synthesis that consumes its stream, holds the generation gate so at most
//! one generation runs at a time. Waiters are served in arrival order.

mod llm;
mod stt;
mod tts;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::voice::{SentenceSegmenter, SpokenReply, SynthesisOrchestrator, strip_suppressed};
use crate::{Error, Result};

pub use llm::ChatServerLlm;
pub use stt::WhisperServerStt;
pub use tts::PiperServerTts;

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a chat prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Lazily produced text fragments of a streaming completion
pub type TokenStream = Box<dyn Iterator<Item = Result<String>> + Send>;

/// Speech recognizer
pub trait Transcriber: Send + Sync {
    /// Transcribe a WAV upload to text
    ///
    /// # Errors
    ///
    /// Returns error if recognition fails
    fn transcribe(&self, audio: &[u8]) -> Result<String>;

    /// Short label for health reporting
    fn describe(&self) -> String;
}

/// Chat language model
pub trait LanguageModel: Send + Sync {
    /// Complete a prompt in one shot
    ///
    /// With `json_mode` the model is constrained to emit a JSON object.
    ///
    /// # Errors
    ///
    /// Returns error if generation fails
    fn generate(&self, messages: &[ChatMessage], json_mode: bool) -> Result<String>;

    /// Start a streaming completion
    ///
    /// # Errors
    ///
    /// Returns error if the stream cannot be opened; later failures surface
    /// as `Err` items
    fn generate_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream>;

    fn describe(&self) -> String;
}

/// Text-to-speech voice
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` into a complete WAV file
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    fn synthesize(&self, text: &str) -> Result<Vec<u8>>;

    /// Synthesize `text` into raw 16-bit mono PCM at [`Self::sample_rate`]
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    fn synthesize_raw(&self, text: &str) -> Result<Vec<u8>>;

    fn sample_rate(&self) -> u32;

    fn describe(&self) -> String;
}

/// Model labels for health reporting
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub llm: String,
    pub whisper: String,
    pub tts: Option<String>,
}

/// A chunked reply in flight
///
/// `frames` yields length-prefixed frames as they are synthesized; `reply`
/// resolves to the full reply text once generation has finished, whether or
/// not anyone was still reading `frames`.
pub struct ChunkedReply {
    pub frames: mpsc::Receiver<Vec<u8>>,
    pub reply: JoinHandle<Result<String>>,
}

/// Shared model handles plus the generation gate
pub struct Engine {
    transcriber: Arc<dyn Transcriber>,
    llm: Arc<dyn LanguageModel>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
    gate: Arc<Mutex<()>>,
}

impl Engine {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        llm: Arc<dyn LanguageModel>,
        synthesizer: Option<Arc<dyn Synthesizer>>,
    ) -> Self {
        Self {
            transcriber,
            llm,
            synthesizer,
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Whether a synthesizer was loaded
    #[must_use]
    pub const fn has_tts(&self) -> bool {
        self.synthesizer.is_some()
    }

    /// Whether a generation currently holds the gate
    #[must_use]
    pub fn is_generating(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    #[must_use]
    pub fn describe(&self) -> ModelSummary {
        ModelSummary {
            llm: self.llm.describe(),
            whisper: self.transcriber.describe(),
            tts: self.synthesizer.as_ref().map(|s| s.describe()),
        }
    }

    fn synthesizer(&self) -> Result<Arc<dyn Synthesizer>> {
        self.synthesizer
            .clone()
            .ok_or(Error::NotConfigured("text-to-speech"))
    }

    /// Transcribe an upload; empty recognition is [`Error::NoSpeech`]
    ///
    /// Recognition does not take the generation gate.
    ///
    /// # Errors
    ///
    /// Returns error if recognition fails or hears nothing
    pub async fn transcribe(&self, audio: Vec<u8>) -> Result<String> {
        let transcriber = Arc::clone(&self.transcriber);
        let text = tokio::task::spawn_blocking(move || transcriber.transcribe(&audio)).await??;

        let text = text.trim();
        if text.is_empty() {
            return Err(Error::NoSpeech);
        }
        Ok(text.to_string())
    }

    /// One-shot completion with suppressed spans removed
    ///
    /// # Errors
    ///
    /// Returns error if generation fails
    pub async fn generate(&self, messages: Vec<ChatMessage>, json_mode: bool) -> Result<String> {
        let permit = Arc::clone(&self.gate).lock_owned().await;
        let llm = Arc::clone(&self.llm);

        // The worker owns the permit so a dropped caller cannot release it early
        let raw = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            llm.generate(&messages, json_mode)
        })
        .await??;
        Ok(strip_suppressed(&raw).trim().to_string())
    }

    /// Stream a completion through synthesis and return one WAV
    ///
    /// # Errors
    ///
    /// Returns error if no synthesizer is loaded, or generation or synthesis
    /// fails
    pub async fn speak(&self, messages: Vec<ChatMessage>) -> Result<SpokenReply> {
        let synthesizer = self.synthesizer()?;
        let permit = Arc::clone(&self.gate).lock_owned().await;
        let llm = Arc::clone(&self.llm);

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let tokens = llm.generate_stream(&messages)?;
            SynthesisOrchestrator::new(synthesizer.as_ref()).batch(SentenceSegmenter::new(tokens))
        })
        .await?
    }

    /// Stream a completion through synthesis as length-prefixed frames
    ///
    /// The gate is held by the worker until generation finishes, even if the
    /// frame receiver is dropped early.
    ///
    /// # Errors
    ///
    /// Returns error if no synthesizer is loaded
    pub async fn speak_chunked(&self, messages: Vec<ChatMessage>) -> Result<ChunkedReply> {
        let synthesizer = self.synthesizer()?;
        let permit = Arc::clone(&self.gate).lock_owned().await;
        let llm = Arc::clone(&self.llm);
        let (tx, frames) = mpsc::channel(8);

        let reply = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let tokens = llm.generate_stream(&messages)?;
            SynthesisOrchestrator::new(synthesizer.as_ref())
                .chunked(SentenceSegmenter::new(tokens), |frame| {
                    tx.blocking_send(frame).is_ok()
                })
        });

        Ok(ChunkedReply { frames, reply })
    }
}
