//! Configuration management for the Vox gateway
//!
//! Precedence: defaults < config file < environment < command line. The
//! command line layer is applied by the binary on the loaded [`Config`].

pub mod file;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use file::VoxConfigFile;

/// Vox gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub stt: SttConfig,
    pub tts: TtsConfig,
    pub server: ServerConfig,
    pub history: HistoryConfig,

    /// Active pipeline names, in activation order; empty serves `/health` only
    pub pipelines: Vec<String>,

    /// System prompt overrides keyed by pipeline name
    pub system_prompts: HashMap<String, String>,
}

/// Language model server settings
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub url: String,
    pub model_path: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl LlmConfig {
    /// Model file name, used as the `model` request field and in health output
    #[must_use]
    pub fn model_name(&self) -> String {
        file_name(&self.model_path)
    }
}

/// Speech recognition server settings
#[derive(Debug, Clone)]
pub struct SttConfig {
    pub url: String,
    pub model: String,
    pub language: String,
}

/// Speech synthesis server settings
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub url: String,
    pub voice: String,
}

impl TtsConfig {
    #[must_use]
    pub fn voice_name(&self) -> String {
        file_name(&self.voice)
    }
}

/// HTTP listener settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Conversation history settings
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    pub max_turns: usize,
    pub file: PathBuf,
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
        .to_string()
}

/// Parse a comma-separated pipeline list
fn parse_pipelines(list: &str) -> Vec<String> {
    list.split(',')
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}

fn parsed<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment value");
            None
        }
    }
}

impl Config {
    /// Load configuration from the config file and process environment
    ///
    /// `VOX_CONFIG` points at an alternate config file.
    #[must_use]
    pub fn load() -> Self {
        let path = std::env::var("VOX_CONFIG").ok().map(PathBuf::from);
        let fc = file::load_config_file(path.as_deref());
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Layer `env` over the config file `fc` over defaults
    pub fn from_sources(fc: VoxConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let llm = LlmConfig {
            url: env("LLM_URL")
                .or(fc.llm.url)
                .unwrap_or_else(|| "http://127.0.0.1:8081".to_string()),
            model_path: env("MODEL_PATH")
                .or(fc.llm.model_path)
                .unwrap_or_else(|| "./models/Qwen_Qwen3-1.7B-Q4_K_M.gguf".to_string()),
            max_tokens: parsed(&env, "MAX_TOKENS")
                .or(fc.llm.max_tokens)
                .unwrap_or(256),
            temperature: parsed(&env, "TEMPERATURE")
                .or(fc.llm.temperature)
                .unwrap_or(0.7),
        };

        let stt = SttConfig {
            url: env("STT_URL")
                .or(fc.stt.url)
                .unwrap_or_else(|| "http://127.0.0.1:8082".to_string()),
            model: env("WHISPER_MODEL")
                .or(fc.stt.model)
                .unwrap_or_else(|| "base".to_string()),
            language: env("WHISPER_LANGUAGE")
                .or(fc.stt.language)
                .unwrap_or_else(|| "es".to_string()),
        };

        let tts = TtsConfig {
            url: env("TTS_URL")
                .or(fc.tts.url)
                .unwrap_or_else(|| "http://127.0.0.1:5000".to_string()),
            voice: env("PIPER_VOICE")
                .or(fc.tts.voice)
                .unwrap_or_else(|| "./voices/es_ES-davefx-medium.onnx".to_string()),
        };

        let server = ServerConfig {
            host: env("HOST")
                .or(fc.server.host)
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed(&env, "PORT").or(fc.server.port).unwrap_or(8080),
        };

        let history = HistoryConfig {
            max_turns: parsed(&env, "MAX_HISTORY_TURNS")
                .or(fc.history.max_turns)
                .unwrap_or(10),
            file: env("HISTORY_FILE")
                .map(PathBuf::from)
                .or(fc.history.file)
                .unwrap_or_else(|| PathBuf::from("./conversation_history.json")),
        };

        let pipelines = env("PIPELINES").map_or_else(
            || {
                fc.pipelines
                    .unwrap_or_default()
                    .into_iter()
                    .map(|name| name.trim().to_lowercase())
                    .filter(|name| !name.is_empty())
                    .collect()
            },
            |list| parse_pipelines(&list),
        );

        let mut system_prompts: HashMap<String, String> = fc
            .prompts
            .into_iter()
            .map(|(name, prompt)| (name.to_lowercase(), prompt))
            .collect();
        // Every registered pipeline, so a later --pipelines override still sees its prompt
        for name in crate::pipelines::available() {
            if let Some(prompt) = env(&format!("{}_SYSTEM_PROMPT", name.to_uppercase())) {
                system_prompts.insert(name.to_string(), prompt);
            }
        }

        Self {
            llm,
            stt,
            tts,
            server,
            history,
            pipelines,
            system_prompts,
        }
    }

    /// Override the active pipelines from a comma-separated list
    pub fn set_pipelines(&mut self, list: &str) {
        self.pipelines = parse_pipelines(list);
    }

    /// System prompt override for `pipeline`, if configured
    #[must_use]
    pub fn system_prompt(&self, pipeline: &str) -> Option<&str> {
        self.system_prompts.get(pipeline).map(String::as_str)
    }
}
