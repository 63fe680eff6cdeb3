//! whisper.cpp server speech recognition

use serde::Deserialize;
use tokio::runtime::Handle;

use super::Transcriber;
use crate::config::SttConfig;
use crate::{Error, Result};

/// Response from the `/inference` endpoint
#[derive(Deserialize)]
struct InferenceResponse {
    #[serde(default)]
    text: String,
}

/// Transcribes WAV uploads through a whisper.cpp `/inference` server
pub struct WhisperServerStt {
    client: reqwest::Client,
    handle: Handle,
    endpoint: String,
    model: String,
    language: String,
}

impl WhisperServerStt {
    /// # Errors
    ///
    /// Returns error if called outside a Tokio runtime
    pub fn new(config: &SttConfig) -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| Error::Config(format!("STT client needs a runtime: {e}")))?;

        Ok(Self {
            client: reqwest::Client::new(),
            handle,
            endpoint: format!("{}/inference", config.url.trim_end_matches('/')),
            model: config.model.clone(),
            language: config.language.clone(),
        })
    }

    async fn transcribe_async(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("language", self.language.clone())
            .text("temperature", "0.0")
            .text("response_format", "json");

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "STT request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "STT server error");
            return Err(Error::Stt(format!("server error {status}: {body}")));
        }

        let result: InferenceResponse = response.json().await?;
        let transcript = result
            .text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        tracing::debug!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}

impl Transcriber for WhisperServerStt {
    fn transcribe(&self, audio: &[u8]) -> Result<String> {
        self.handle.block_on(self.transcribe_async(audio))
    }

    fn describe(&self) -> String {
        self.model.clone()
    }
}
