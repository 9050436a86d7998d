//! Kokoro asset resolution from HuggingFace Hub.

use crate::config::{ModelConfig, TtsConfig};
use crate::error::Result;
use crate::models::ModelManager;
use std::path::{Path, PathBuf};
use tracing::warn;

/// HuggingFace repo for Kokoro-82M ONNX models.
pub const KOKORO_REPO_ID: &str = "onnx-community/Kokoro-82M-v1.0-ONNX";

/// Paths to downloaded Kokoro assets.
pub struct KokoroPaths {
    /// Path to the ONNX model file (inside `onnx/` subfolder).
    pub model_onnx: PathBuf,
    /// Path to `tokenizer.json`.
    pub tokenizer_json: PathBuf,
    /// Path to the voice `.bin` file.
    pub voice_bin: PathBuf,
}

/// Map a variant name to the ONNX filename inside the `onnx/` subfolder.
pub fn model_filename(variant: &str) -> &'static str {
    match variant {
        "fp32" => "onnx/model.onnx",
        "fp16" => "onnx/model_fp16.onnx",
        "q8" | "quantized" => "onnx/model_quantized.onnx",
        "q8f16" => "onnx/model_q8f16.onnx",
        "q4" => "onnx/model_q4.onnx",
        "q4f16" => "onnx/model_q4f16.onnx",
        _ => {
            warn!("unknown Kokoro model variant '{variant}', falling back to q8");
            "onnx/model_quantized.onnx"
        }
    }
}

/// Repo-relative voice file for a voice name.
///
/// Returns `None` when `voice` is an absolute path to a custom `.bin` file.
pub fn voice_filename(voice: &str) -> Option<String> {
    let path = Path::new(voice);
    if path.is_absolute() && path.extension().is_some_and(|ext| ext == "bin") {
        None
    } else {
        Some(format!("voices/{voice}.bin"))
    }
}

/// Whether a voice uses British English pronunciation (`bf_*` / `bm_*`).
pub fn is_british_voice(voice: &str) -> bool {
    let name = Path::new(voice)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(voice);
    name.starts_with("bf_") || name.starts_with("bm_")
}

/// Download (or verify cache of) every asset the configured voice needs.
///
/// # Errors
///
/// Returns an error if any download fails.
pub fn download_kokoro_assets(config: &TtsConfig, models: &ModelConfig) -> Result<KokoroPaths> {
    let manager = ModelManager::new(models)?;

    let model_onnx = manager.get_model_path(KOKORO_REPO_ID, model_filename(&config.model_variant))?;
    let tokenizer_json = manager.get_model_path(KOKORO_REPO_ID, "tokenizer.json")?;
    let voice_bin = match voice_filename(&config.voice) {
        Some(file) => manager.get_model_path(KOKORO_REPO_ID, &file)?,
        None => PathBuf::from(&config.voice),
    };

    Ok(KokoroPaths {
        model_onnx,
        tokenizer_json,
        voice_bin,
    })
}
