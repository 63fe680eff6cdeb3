//! Daemon - the main gateway service
//!
//! Resolves the configured pipelines, wires the model adapters they need,
//! opens their conversation logs and serves them until Ctrl-C.

use std::sync::Arc;

use crate::api::{ApiServer, ApiServerBuilder};
use crate::engine::{ChatServerLlm, Engine, PiperServerTts, Synthesizer, WhisperServerStt};
use crate::history::{ConversationStore, HistoryDocument};
use crate::pipelines;
use crate::{Config, Result};

/// The Vox daemon
pub struct Daemon {
    config: Config,
}

impl Daemon {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Build the engine for the given TTS requirement
    fn engine(&self, requires_tts: bool) -> Result<Engine> {
        tracing::info!(
            url = %self.config.llm.url,
            model = %self.config.llm.model_name(),
            max_tokens = self.config.llm.max_tokens,
            temperature = self.config.llm.temperature,
            "using LLM server"
        );
        let llm = Arc::new(ChatServerLlm::new(&self.config.llm)?);

        tracing::info!(
            url = %self.config.stt.url,
            model = %self.config.stt.model,
            language = %self.config.stt.language,
            "using STT server"
        );
        let stt = Arc::new(WhisperServerStt::new(&self.config.stt)?);

        let tts: Option<Arc<dyn Synthesizer>> = if requires_tts {
            tracing::info!(url = %self.config.tts.url, voice = %self.config.tts.voice, "using TTS server");
            Some(Arc::new(PiperServerTts::new(&self.config.tts)?))
        } else {
            tracing::info!("TTS not required by any pipeline, skipping");
            None
        };

        Ok(Engine::new(stt, llm, tts))
    }

    /// Assemble the API server for the configured pipelines
    ///
    /// # Errors
    ///
    /// Returns error if a model adapter cannot be created
    pub fn server(&self) -> Result<ApiServer> {
        let active = pipelines::resolve(&self.config.pipelines);
        let mut builder = ApiServerBuilder::new(self.config.server.host.clone(), self.config.server.port);

        if active.is_empty() {
            tracing::info!("no pipelines configured, serving /health only");
            return builder.build();
        }

        let requires_tts = active.iter().any(|p| p.requires_tts());
        builder = builder.engine(Arc::new(self.engine(requires_tts)?));

        let mut store = ConversationStore::new(
            HistoryDocument::new(&self.config.history.file),
            self.config.history.max_turns,
        );

        for pipeline in active {
            let prompt = match self.config.system_prompt(pipeline.name()) {
                Some(prompt) => {
                    tracing::info!(pipeline = pipeline.name(), "system prompt overridden by configuration");
                    prompt
                }
                None => pipeline.default_system_prompt(),
            };
            let conversation = store.open(pipeline.name(), prompt);
            tracing::info!(
                pipeline = pipeline.name(),
                tts = pipeline.requires_tts(),
                history = conversation.len(),
                "pipeline loaded"
            );
            builder = builder.pipeline(pipeline, conversation);
        }

        builder.build()
    }

    /// Run the gateway until Ctrl-C
    ///
    /// # Errors
    ///
    /// Returns error if the server cannot be built or fails to bind
    pub async fn run(self) -> Result<()> {
        let server = self.server()?;

        server
            .run(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => tracing::info!("shutting down"),
                    Err(e) => {
                        tracing::warn!(error = %e, "cannot listen for Ctrl-C");
                        std::future::pending::<()>().await;
                    }
                }
            })
            .await
    }
}
