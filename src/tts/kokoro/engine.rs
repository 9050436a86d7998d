//! Kokoro-82M ONNX inference engine.
//!
//! Single-model TTS: phonemize → tokenize → ONNX inference → 24 kHz audio.

use super::download::{KokoroPaths, download_kokoro_assets, is_british_voice};
use super::phonemize::Phonemizer;
use crate::audio;
use crate::config::{ModelConfig, TtsConfig};
use crate::error::{Result, SpeechError};
use crate::tts::{Synthesizer, split_sentences};
use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info};

/// Maximum context length for Kokoro (including pad tokens).
const MAX_CONTEXT: usize = 512;

/// Output sample rate in Hz.
const SAMPLE_RATE: u32 = 24_000;

/// Width of one voice style vector.
const STYLE_DIM: usize = 256;

/// Silence inserted between synthesized sentences.
const SENTENCE_GAP_MS: u32 = 150;

/// Kokoro TTS engine.
///
/// Inference needs exclusive access to the ONNX session, so calls from
/// concurrent requests are serialized on the inner mutex.
pub struct KokoroTts {
    engine: Arc<Mutex<KokoroEngine>>,
}

impl KokoroTts {
    /// Download (if needed) and load the Kokoro model and voice.
    ///
    /// # Errors
    ///
    /// Returns an error if model download or loading fails.
    pub fn load(config: &TtsConfig, models: &ModelConfig) -> Result<Self> {
        let paths = download_kokoro_assets(config, models)?;
        Self::from_paths(paths, config)
    }

    fn from_paths(paths: KokoroPaths, config: &TtsConfig) -> Result<Self> {
        let engine = KokoroEngine::load(&paths, config)?;
        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
        })
    }
}

#[async_trait]
impl Synthesizer for KokoroTts {
    async fn synthesize_to_file(&self, text: &str, output: &Path) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        let text = text.to_owned();
        let output: PathBuf = output.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let mut engine = engine
                .lock()
                .map_err(|_| SpeechError::Tts("TTS engine lock poisoned".into()))?;
            let samples = engine.synthesize_text(&text)?;
            audio::write_wav_mono(&output, &samples, SAMPLE_RATE)
        })
        .await
        .map_err(|e| SpeechError::Tts(format!("synthesis task failed: {e}")))?
    }
}

struct KokoroEngine {
    session: Session,
    tokenizer: tokenizers::Tokenizer,
    phonemizer: Phonemizer,
    /// Raw voice style tensor: shape `(N, 1, 256)` stored flat.
    /// Index by `[token_count]` to get the context-appropriate 256-dim slice.
    voice_styles: Vec<f32>,
    speed: f32,
}

impl KokoroEngine {
    fn load(paths: &KokoroPaths, config: &TtsConfig) -> Result<Self> {
        info!("loading Kokoro ONNX model: {}", paths.model_onnx.display());
        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(4).map_err(ort::Error::from))
            .and_then(|mut b| b.commit_from_file(&paths.model_onnx))
            .map_err(|e| SpeechError::Tts(format!("failed to load Kokoro ONNX model: {e}")))?;

        let tokenizer = load_tokenizer(&paths.tokenizer_json)?;
        let phonemizer = Phonemizer::new(is_british_voice(&config.voice));
        let voice_styles = load_voice_styles(&paths.voice_bin)?;

        info!(
            "Kokoro TTS ready (voice={}, variant={})",
            config.voice, config.model_variant
        );

        Ok(Self {
            session,
            tokenizer,
            phonemizer,
            voice_styles,
            speed: config.speed.clamp(0.5, 2.0),
        })
    }

    /// Synthesize a whole reply, one sentence at a time.
    fn synthesize_text(&mut self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let gap = vec![0.0f32; (SAMPLE_RATE * SENTENCE_GAP_MS / 1000) as usize];
        let mut samples: Vec<f32> = Vec::new();

        for sentence in split_sentences(text) {
            let chunk = self.synthesize_chunk(sentence)?;
            if chunk.is_empty() {
                continue;
            }
            if !samples.is_empty() {
                samples.extend_from_slice(&gap);
            }
            samples.extend(chunk);
        }

        info!(
            "synthesized {:.1}s of audio in {:.0}ms",
            samples.len() as f32 / SAMPLE_RATE as f32,
            start.elapsed().as_millis()
        );
        Ok(samples)
    }

    /// Synthesize one chunk, halving it by words while it overflows the context.
    fn synthesize_chunk(&mut self, text: &str) -> Result<Vec<f32>> {
        let ipa = self.phonemizer.phonemize(text)?;
        if ipa.is_empty() {
            return Ok(Vec::new());
        }

        let token_ids = self.tokenize(&ipa)?;
        if token_ids.len() <= MAX_CONTEXT {
            let style = self.style_for(token_ids.len() - 2);
            return self.run_inference(&token_ids, &style);
        }

        let words: Vec<&str> = text.split_whitespace().collect();
        if words.len() < 2 {
            return Err(SpeechError::Tts(format!(
                "input too long: {} tokens (max {MAX_CONTEXT})",
                token_ids.len()
            )));
        }
        debug!("chunk of {} tokens exceeds context, splitting", token_ids.len());
        let (left, right) = words.split_at(words.len() / 2);
        let mut samples = self.synthesize_chunk(&left.join(" "))?;
        samples.extend(self.synthesize_chunk(&right.join(" "))?);
        Ok(samples)
    }

    /// Tokenize phonemes and wrap with the pad token (id 0) on both ends.
    fn tokenize(&self, ipa: &str) -> Result<Vec<i64>> {
        let encoding = self
            .tokenizer
            .encode(ipa, false)
            .map_err(|e| SpeechError::Tts(format!("tokenization failed: {e}")))?;

        let raw_ids = encoding.get_ids();
        let mut token_ids: Vec<i64> = Vec::with_capacity(raw_ids.len() + 2);
        token_ids.push(0);
        token_ids.extend(raw_ids.iter().map(|&id| i64::from(id)));
        token_ids.push(0);
        Ok(token_ids)
    }

    /// Style vector for an utterance of `content_len` tokens.
    fn style_for(&self, content_len: usize) -> Vec<f32> {
        let entries = self.voice_styles.len() / STYLE_DIM;
        let index = content_len.max(1).min(entries.saturating_sub(1));
        let offset = index * STYLE_DIM;
        self.voice_styles[offset..offset + STYLE_DIM].to_vec()
    }

    /// Run a single ONNX inference call.
    fn run_inference(&mut self, token_ids: &[i64], style: &[f32]) -> Result<Vec<f32>> {
        use ort::session::{SessionInputValue, SessionInputs};

        let seq_len = token_ids.len();

        let input_ids = Tensor::from_array(([1_usize, seq_len], token_ids.to_vec()))
            .map_err(|e| SpeechError::Tts(format!("failed to create input_ids tensor: {e}")))?;
        let style_tensor = Tensor::from_array(([1_usize, STYLE_DIM], style.to_vec()))
            .map_err(|e| SpeechError::Tts(format!("failed to create style tensor: {e}")))?;
        let speed_tensor = Tensor::from_array(([1_usize], vec![self.speed]))
            .map_err(|e| SpeechError::Tts(format!("failed to create speed tensor: {e}")))?;

        let mut feed: HashMap<String, SessionInputValue> = HashMap::new();
        feed.insert("input_ids".to_string(), input_ids.into());
        feed.insert("style".to_string(), style_tensor.into());
        feed.insert("speed".to_string(), speed_tensor.into());

        let outputs = self
            .session
            .run(SessionInputs::from(feed))
            .map_err(|e| SpeechError::Tts(format!("ONNX inference failed: {e}")))?;

        // Output: shape [1, num_samples]
        let (_shape, data) = outputs[0_usize]
            .try_extract_tensor::<f32>()
            .map_err(|e| SpeechError::Tts(format!("failed to extract output tensor: {e}")))?;

        Ok(data.to_vec())
    }
}

/// Load and patch the Kokoro tokenizer.
///
/// The `tokenizers` crate v0.22 cannot deserialize the `TemplateProcessing`
/// post-processor in Kokoro's `tokenizer.json`. It is removed here and pad
/// tokens are added in [`KokoroEngine::tokenize`].
fn load_tokenizer(path: &Path) -> Result<tokenizers::Tokenizer> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        SpeechError::Tts(format!(
            "failed to read tokenizer file {}: {e}",
            path.display()
        ))
    })?;

    let patched = patch_tokenizer_json(&raw)?;

    tokenizers::Tokenizer::from_bytes(patched)
        .map_err(|e| SpeechError::Tts(format!("failed to load tokenizer: {e}")))
}

/// Strip the post-processor and give the vocab an explicit WordLevel model.
fn patch_tokenizer_json(raw: &str) -> Result<String> {
    let mut json: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| SpeechError::Tts(format!("failed to parse tokenizer JSON: {e}")))?;

    if let Some(obj) = json.as_object_mut() {
        obj.remove("post_processor");

        if let Some(model) = obj.get_mut("model").and_then(|m| m.as_object_mut()) {
            model
                .entry("type")
                .or_insert_with(|| serde_json::Value::String("WordLevel".to_owned()));
            model
                .entry("unk_token")
                .or_insert_with(|| serde_json::Value::String("$".to_owned()));
        }
    }

    serde_json::to_string(&json)
        .map_err(|e| SpeechError::Tts(format!("failed to serialize patched tokenizer: {e}")))
}

/// Load a voice style `.bin` file as a flat f32 vector.
///
/// The file holds little-endian f32 values with shape `(N, 1, 256)`.
fn load_voice_styles(path: &Path) -> Result<Vec<f32>> {
    let bytes = std::fs::read(path).map_err(|e| {
        SpeechError::Tts(format!("failed to read voice file {}: {e}", path.display()))
    })?;
    let floats = decode_voice_styles(&bytes)?;
    info!("loaded voice style: {} entries", floats.len() / STYLE_DIM);
    Ok(floats)
}

fn decode_voice_styles(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(SpeechError::Tts(format!(
            "voice file size {} is not a multiple of 4 (expected f32 array)",
            bytes.len()
        )));
    }

    let floats: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    if floats.is_empty() || floats.len() % STYLE_DIM != 0 {
        return Err(SpeechError::Tts(format!(
            "voice file has {} floats, not a positive multiple of {STYLE_DIM}",
            floats.len()
        )));
    }
    Ok(floats)
}
