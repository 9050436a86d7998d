//! Startup initialization: validates config and eagerly loads every model.
//!
//! Call [`initialize_models`] once before serving so requests never wait on
//! a download or a model load.

use crate::config::SpeechConfig;
use crate::error::{Result, SpeechError};
use crate::llm::ApiLlm;
use crate::pipeline::ConversationPipeline;
use crate::stt::ParakeetStt;
use crate::tts::KokoroTts;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Pre-loaded model instances ready for the pipeline.
pub struct InitializedModels {
    /// Parakeet TDT speech-to-text engine.
    pub stt: ParakeetStt,
    /// Client for the OpenAI-compatible generation server.
    pub llm: ApiLlm,
    /// Kokoro TTS engine.
    pub tts: KokoroTts,
}

impl InitializedModels {
    /// Wire the loaded models into a request pipeline.
    pub fn into_pipeline(self, config: &SpeechConfig) -> ConversationPipeline {
        ConversationPipeline::new(
            Arc::new(self.stt),
            Arc::new(self.llm),
            Arc::new(self.tts),
            config,
        )
    }
}

/// Validate `config`, prepare directories, and load all three models.
///
/// Model loading blocks on downloads and ONNX session setup, so it runs on
/// a blocking thread.
///
/// # Errors
///
/// Returns an error if the config is invalid, a directory cannot be created,
/// or any model fails to load. Callers should treat this as fatal.
pub async fn initialize_models(config: &SpeechConfig) -> Result<InitializedModels> {
    config.validate()?;
    std::fs::create_dir_all(&config.server.audio_dir)?;
    std::fs::create_dir_all(&config.server.temp_dir)?;

    let llm = ApiLlm::new(&config.llm)?;
    info!(
        "LLM backend: {} (model {})",
        config.llm.api_url, config.llm.model
    );

    let config = config.clone();
    let (stt, tts) = tokio::task::spawn_blocking(move || -> Result<_> {
        let stt = load_model("STT", || ParakeetStt::load(&config.stt, &config.models))?;
        let tts = load_model("TTS", || KokoroTts::load(&config.tts, &config.models))?;
        Ok((stt, tts))
    })
    .await
    .map_err(|e| SpeechError::Model(format!("model loading task failed: {e}")))??;

    Ok(InitializedModels { stt, llm, tts })
}

/// Load a model with timing and logging.
fn load_model<T>(label: &str, load: impl FnOnce() -> Result<T>) -> Result<T> {
    info!("loading {label} model");
    let start = Instant::now();
    let model = load()?;
    info!("{label} model loaded in {:.1}s", start.elapsed().as_secs_f64());
    Ok(model)
}
