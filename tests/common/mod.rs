//! Shared test utilities
//!
//! Scripted stand-ins for the three model servers plus helpers that mount
//! pipelines on a router without binding a socket.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::Request;
use vox_gateway::api::ApiServerBuilder;
use vox_gateway::engine::TokenStream;
use vox_gateway::history::{ConversationLog, HistoryDocument};
use vox_gateway::voice::wav::pcm_to_wav;
use vox_gateway::{ChatMessage, Engine, Error, LanguageModel, Result, Synthesizer, Transcriber, pipelines};

pub const SAMPLE_RATE: u32 = 16_000;

/// PCM bytes the mock voice produces per input character
pub const PCM_BYTES_PER_CHAR: usize = 20;

/// Transcriber that always hears the same words
pub struct ScriptedStt {
    pub text: String,
}

impl Transcriber for ScriptedStt {
    fn transcribe(&self, _audio: &[u8]) -> Result<String> {
        Ok(self.text.clone())
    }

    fn describe(&self) -> String {
        "scripted-stt".to_string()
    }
}

/// Language model with a canned reply that tracks how many calls overlap
pub struct ScriptedLlm {
    reply: String,
    fragment_len: usize,
    delay: Duration,
    fail: bool,
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            fragment_len: 3,
            delay: Duration::ZERO,
            fail: false,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Hold each call for `delay` so overlapping callers would be visible
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every call fails
    #[must_use]
    pub const fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Highest number of calls observed in flight at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            return Err(Error::Llm("scripted failure".to_string()));
        }
        Ok(())
    }

    /// The reply cut into small pieces, splitting words mid-way
    fn fragments(&self) -> Vec<String> {
        let chars: Vec<char> = self.reply.chars().collect();
        chars
            .chunks(self.fragment_len)
            .map(|chunk| chunk.iter().collect())
            .collect()
    }
}

impl LanguageModel for ScriptedLlm {
    fn generate(&self, _messages: &[ChatMessage], _json_mode: bool) -> Result<String> {
        self.enter()?;
        Ok(self.reply.clone())
    }

    fn generate_stream(&self, _messages: &[ChatMessage]) -> Result<TokenStream> {
        self.enter()?;
        Ok(Box::new(self.fragments().into_iter().map(Ok)))
    }

    fn describe(&self) -> String {
        "scripted-llm".to_string()
    }
}

/// Voice that emits a fixed amount of silence per character
pub struct SilentTts;

impl Synthesizer for SilentTts {
    fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        pcm_to_wav(&self.synthesize_raw(text)?, SAMPLE_RATE)
    }

    fn synthesize_raw(&self, text: &str) -> Result<Vec<u8>> {
        Ok(vec![0; text.chars().count() * PCM_BYTES_PER_CHAR])
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn describe(&self) -> String {
        "silent-tts".to_string()
    }
}

/// Engine over scripted models
pub fn engine(heard: &str, llm: Arc<ScriptedLlm>, with_tts: bool) -> Arc<Engine> {
    let stt = Arc::new(ScriptedStt {
        text: heard.to_string(),
    });
    let tts: Option<Arc<dyn Synthesizer>> = if with_tts {
        Some(Arc::new(SilentTts))
    } else {
        None
    };
    Arc::new(Engine::new(stt, llm, tts))
}

/// Conversation log that never touches disk
pub fn conversation(name: &str, max_turns: usize) -> Arc<ConversationLog> {
    Arc::new(ConversationLog::open(
        name,
        format!("system prompt for {name}"),
        max_turns,
        Arc::new(HistoryDocument::in_memory()),
    ))
}

/// Router with the named pipelines mounted over `engine`
pub fn app(engine: Arc<Engine>, mounted: &[(&str, Arc<ConversationLog>)]) -> Router {
    let mut builder = ApiServerBuilder::new("127.0.0.1", 0).engine(engine);
    for (name, log) in mounted {
        let pipeline = pipelines::create(name).expect("registered pipeline");
        builder = builder.pipeline(pipeline, Arc::clone(log));
    }
    builder.build().expect("valid server").router()
}

/// A short, silent 16 kHz mono WAV upload
pub fn wav_upload() -> Vec<u8> {
    pcm_to_wav(&[0; 3200], SAMPLE_RATE).expect("wav")
}

/// POST a raw audio body
pub fn post_audio(uri: &str, audio: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "audio/wav")
        .body(Body::from(audio))
        .unwrap()
}

/// POST audio as a multipart form with an `audio` field
pub fn post_multipart(uri: &str, audio: &[u8]) -> Request<Body> {
    const BOUNDARY: &str = "vox-test-boundary";

    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"audio\"; filename=\"audio.wav\"\r\nContent-Type: audio/wav\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(audio);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
