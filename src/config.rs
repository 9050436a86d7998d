//! Configuration types for the conversation server.

use crate::error::{Result, SpeechError};
use crate::llm::prompt::DEFAULT_HISTORY_LIMIT;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

/// Placeholder shipped as the default LLM model id.
///
/// Startup refuses to run until it is replaced with a real model identifier.
pub const MODEL_PLACEHOLDER: &str = "ADD_MODEL_ID_HERE";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Speech-to-text settings.
    pub stt: SttConfig,
    /// Language model settings.
    pub llm: LlmConfig,
    /// Text-to-speech settings.
    pub tts: TtsConfig,
    /// Model management settings.
    pub models: ModelConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind (use 0 for auto-assign).
    pub port: u16,
    /// The single origin allowed to make cross-origin requests.
    pub cors_origin: String,
    /// Directory holding synthesized responses. Served statically.
    pub audio_dir: PathBuf,
    /// URL prefix under which `audio_dir` is served.
    pub audio_url_prefix: String,
    /// Directory for uploaded audio while it is being transcribed.
    pub temp_dir: PathBuf,
    /// Maximum accepted request body size in bytes.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8000,
            cors_origin: "http://localhost:5173".to_owned(),
            audio_dir: PathBuf::from("audio_files"),
            audio_url_prefix: "/audio_files".to_owned(),
            temp_dir: std::env::temp_dir().join("speakwell"),
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

/// Speech-to-text configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// HuggingFace model ID for the STT model.
    pub model_id: String,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            // ONNX export; the upstream NVIDIA repo only ships .nemo checkpoints.
            model_id: "istupakov/parakeet-tdt-0.6b-v3-onnx".to_owned(),
        }
    }
}

/// Language model configuration.
///
/// Generation goes through an OpenAI-compatible chat completions server
/// (vLLM, llama.cpp server, Ollama, ...). The server applies the model's
/// own chat template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL for the API server.
    pub api_url: String,
    /// Model identifier to request, e.g. `Qwen/Qwen2.5-14B-Instruct`.
    pub model: String,
    /// Bearer token. Typically empty for local servers.
    pub api_key: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Top-p (nucleus) sampling threshold.
    pub top_p: f64,
    /// Repetition penalty for generated tokens.
    pub repetition_penalty: f32,
    /// Maximum tokens to generate per reply.
    pub max_tokens: usize,
    /// Number of most recent turns forwarded to the model.
    pub history_limit: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            // vLLM default endpoint.
            api_url: "http://localhost:8001".to_owned(),
            model: MODEL_PLACEHOLDER.to_owned(),
            api_key: String::new(),
            temperature: 0.7,
            top_p: 0.8,
            repetition_penalty: 1.05,
            max_tokens: 512,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// Text-to-speech configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Kokoro voice name (e.g. `af_heart`) or absolute path to a voice `.bin`.
    pub voice: String,
    /// ONNX model variant: "fp32", "fp16", "q8", "q8f16", "q4", "q4f16", "quantized".
    pub model_variant: String,
    /// Speech speed multiplier (0.5–2.0).
    pub speed: f32,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            voice: "af_heart".to_owned(),
            model_variant: "q8".to_owned(),
            speed: 1.0,
        }
    }
}

/// Model management configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory for caching downloaded models.
    pub cache_dir: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            cache_dir: dirs_cache_dir(),
        }
    }
}

/// Returns the default model cache directory.
fn dirs_cache_dir() -> PathBuf {
    if let Some(cache) = std::env::var_os("XDG_CACHE_HOME") {
        PathBuf::from(cache).join("speakwell")
    } else if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".cache").join("speakwell")
    } else {
        PathBuf::from("/tmp/speakwell-cache")
    }
}

impl SpeechConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| SpeechError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SpeechError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load the config at `path`, or write the defaults there if it is missing.
    ///
    /// A failed first-run write is logged and the defaults are still returned.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_or_init(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            return Self::from_file(path);
        }
        let config = Self::default();
        match config.save_to_file(path) {
            Ok(()) => info!("wrote default config to {}", path.display()),
            Err(e) => warn!("could not write default config to {}: {e}", path.display()),
        }
        Ok(config)
    }

    /// Returns the default config file path: `~/.config/speakwell/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("speakwell").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("speakwell")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/speakwell-config/config.toml")
        }
    }

    /// Check that the configuration is usable for serving.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let model = self.llm.model.trim();
        if model.is_empty() || model == MODEL_PLACEHOLDER {
            return Err(SpeechError::Config(
                "llm.model is not set; configure a concrete model identifier \
                 (e.g. \"Qwen/Qwen2.5-14B-Instruct\")"
                    .to_owned(),
            ));
        }
        if self.llm.history_limit == 0 {
            return Err(SpeechError::Config(
                "llm.history_limit must be at least 1".to_owned(),
            ));
        }
        if self.llm.max_tokens == 0 {
            return Err(SpeechError::Config(
                "llm.max_tokens must be at least 1".to_owned(),
            ));
        }
        if !(0.0..=1.0).contains(&self.llm.top_p) {
            return Err(SpeechError::Config(format!(
                "llm.top_p must be within 0.0..=1.0 (got {})",
                self.llm.top_p
            )));
        }
        if self.llm.temperature < 0.0 {
            return Err(SpeechError::Config(format!(
                "llm.temperature must not be negative (got {})",
                self.llm.temperature
            )));
        }
        if !self.server.audio_url_prefix.starts_with('/') {
            return Err(SpeechError::Config(format!(
                "server.audio_url_prefix must start with '/' (got {:?})",
                self.server.audio_url_prefix
            )));
        }
        Ok(())
    }
}
