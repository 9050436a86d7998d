//! Speech-to-text using NVIDIA Parakeet TDT.
//!
//! The [`Transcriber`] trait is the seam the request pipeline depends on;
//! [`ParakeetStt`] is the production implementation backed by `parakeet-rs`.

use crate::audio::{self, STT_SAMPLE_RATE};
use crate::config::{ModelConfig, SttConfig};
use crate::error::{Result, SpeechError};
use crate::models::ModelManager;
use async_trait::async_trait;
use parakeet_rs::{ParakeetTDT, TimestampMode, Transcriber as _};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::info;

/// Turns a recorded audio file into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the audio file at `path`.
    ///
    /// Returns the concatenated text of every recognized segment. An empty
    /// string means nothing intelligible was heard.
    async fn transcribe(&self, path: &Path) -> Result<String>;
}

/// Model files required by Parakeet TDT.
const ENCODER_ONNX: &str = "encoder-model.onnx";
const ENCODER_DATA: &str = "encoder-model.onnx.data";
const DECODER_ONNX: &str = "decoder_joint-model.onnx";
const VOCAB_TXT: &str = "vocab.txt";

/// Speech-to-text engine using Parakeet TDT (multilingual, 25 languages).
///
/// The ONNX sessions need exclusive access during inference, so calls from
/// concurrent requests are serialized on the inner mutex.
pub struct ParakeetStt {
    model: Arc<Mutex<ParakeetTDT>>,
}

impl ParakeetStt {
    /// Download (if needed) and load the Parakeet model.
    ///
    /// # Errors
    ///
    /// Returns an error if a model file cannot be fetched or the model fails to load.
    pub fn load(config: &SttConfig, model_config: &ModelConfig) -> Result<Self> {
        info!("loading STT model: {}", config.model_id);
        let manager = ModelManager::new(model_config)?;
        let repo_dir = manager.get_repo_dir(
            &config.model_id,
            &[ENCODER_ONNX, ENCODER_DATA, DECODER_ONNX, VOCAB_TXT],
        )?;

        let model = ParakeetTDT::from_pretrained(&repo_dir, None)
            .map_err(|e| SpeechError::Stt(format!("failed to load Parakeet TDT: {e}")))?;

        info!("STT model loaded successfully");
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
        })
    }
}

#[async_trait]
impl Transcriber for ParakeetStt {
    async fn transcribe(&self, path: &Path) -> Result<String> {
        let model = Arc::clone(&self.model);
        let path: PathBuf = path.to_path_buf();

        tokio::task::spawn_blocking(move || transcribe_blocking(&model, &path))
            .await
            .map_err(|e| SpeechError::Stt(format!("transcription task failed: {e}")))?
    }
}

fn transcribe_blocking(model: &Mutex<ParakeetTDT>, path: &Path) -> Result<String> {
    let start = Instant::now();
    let audio = audio::decode_to_mono(path)?.resampled(STT_SAMPLE_RATE);
    if audio.samples.is_empty() {
        return Ok(String::new());
    }
    info!("transcribing {:.1}s of audio", audio.duration_secs());

    let mut model = model
        .lock()
        .map_err(|_| SpeechError::Stt("STT model lock poisoned".into()))?;

    let result = model
        .transcribe_samples(
            audio.samples,
            audio.sample_rate,
            1, // mono
            Some(TimestampMode::Sentences),
        )
        .map_err(|e| SpeechError::Stt(format!("transcription failed: {e}")))?;

    // Sentence segments are already joined into `text` by the decoder.
    let text = result.text.trim().to_owned();

    info!(
        "transcribed in {:.0}ms: \"{}\"",
        start.elapsed().as_millis(),
        text
    );
    Ok(text)
}
