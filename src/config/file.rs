//! TOML configuration file loading
//!
//! Supports `~/.config/vox/gateway/config.toml` (or the path in `VOX_CONFIG`)
//! as a persistent config source. All fields are optional; the file is a
//! partial overlay on top of defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct VoxConfigFile {
    /// Pipelines to activate (e.g. `["robot", "assistant"]`)
    #[serde(default)]
    pub pipelines: Option<Vec<String>>,

    #[serde(default)]
    pub llm: LlmFileConfig,

    #[serde(default)]
    pub stt: SttFileConfig,

    #[serde(default)]
    pub tts: TtsFileConfig,

    #[serde(default)]
    pub server: ServerFileConfig,

    #[serde(default)]
    pub history: HistoryFileConfig,

    /// System prompt overrides keyed by pipeline name
    #[serde(default)]
    pub prompts: HashMap<String, String>,
}

/// Language model configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Chat completions server base URL
    pub url: Option<String>,
    /// GGUF model the server was started with
    pub model_path: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Speech recognition configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// whisper.cpp server base URL
    pub url: Option<String>,
    /// Whisper model size (e.g. "base")
    pub model: Option<String>,
    pub language: Option<String>,
}

/// Speech synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// Piper HTTP server URL
    pub url: Option<String>,
    /// Path to the `.onnx` voice
    pub voice: Option<String>,
}

/// HTTP listener configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Conversation history configuration
#[derive(Debug, Default, Deserialize)]
pub struct HistoryFileConfig {
    /// Turns (user + assistant pairs) kept per pipeline
    pub max_turns: Option<usize>,
    /// Shared history document
    pub file: Option<PathBuf>,
}

/// Load the TOML config file from `path`, or from the standard path
///
/// Returns `VoxConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> VoxConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return VoxConfigFile::default();
    };

    if !path.exists() {
        return VoxConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                VoxConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            VoxConfigFile::default()
        }
    }
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the TOML is malformed
pub fn parse(content: &str) -> crate::Result<VoxConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Return the config file path: `~/.config/vox/gateway/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("vox")
            .join("gateway")
            .join("config.toml")
    })
}
