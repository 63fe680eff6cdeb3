//! Piper HTTP server text-to-speech

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use super::Synthesizer;
use crate::config::TtsConfig;
use crate::voice::wav;
use crate::{Error, Result};

/// Rate used when the voice config cannot be read
const DEFAULT_SAMPLE_RATE: u32 = 22050;

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
}

/// The part of a Piper `<voice>.onnx.json` file we care about
#[derive(Deserialize)]
struct VoiceConfig {
    audio: VoiceAudio,
}

#[derive(Deserialize)]
struct VoiceAudio {
    sample_rate: u32,
}

/// Read the sample rate from the voice's `.onnx.json` companion file
fn voice_sample_rate(voice: &str) -> Option<u32> {
    let path = Path::new(voice);
    let config_path = path.with_file_name(format!("{}.json", path.file_name()?.to_str()?));

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| {
            tracing::debug!(path = %config_path.display(), error = %e, "voice config not readable");
        })
        .ok()?;

    match serde_json::from_str::<VoiceConfig>(&contents) {
        Ok(config) => Some(config.audio.sample_rate),
        Err(e) => {
            tracing::warn!(path = %config_path.display(), error = %e, "invalid voice config");
            None
        }
    }
}

/// Synthesizes speech through a Piper HTTP server
pub struct PiperServerTts {
    client: reqwest::Client,
    handle: Handle,
    url: String,
    voice: String,
    sample_rate: u32,
}

impl PiperServerTts {
    /// # Errors
    ///
    /// Returns error if called outside a Tokio runtime
    pub fn new(config: &TtsConfig) -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| Error::Config(format!("TTS client needs a runtime: {e}")))?;

        let sample_rate = voice_sample_rate(&config.voice).unwrap_or(DEFAULT_SAMPLE_RATE);
        tracing::debug!(voice = %config.voice, sample_rate, "TTS voice configured");

        Ok(Self {
            client: reqwest::Client::new(),
            handle,
            url: config.url.clone(),
            voice: config.voice_name(),
            sample_rate,
        })
    }

    async fn synthesize_async(&self, text: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(&self.url)
            .json(&SynthesisRequest { text })
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "TTS request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("server error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}

impl Synthesizer for PiperServerTts {
    fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        self.handle.block_on(self.synthesize_async(text))
    }

    fn synthesize_raw(&self, text: &str) -> Result<Vec<u8>> {
        let pcm = wav::wav_to_pcm(&self.synthesize(text)?)
            .map_err(|e| Error::Tts(format!("unexpected audio from server: {e}")))?;

        if pcm.sample_rate != self.sample_rate || pcm.channels != 1 {
            return Err(Error::Tts(format!(
                "server audio is {} Hz x{}, expected {} Hz mono",
                pcm.sample_rate, pcm.channels, self.sample_rate
            )));
        }
        Ok(pcm.data)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn describe(&self) -> String {
        self.voice.clone()
    }
}
