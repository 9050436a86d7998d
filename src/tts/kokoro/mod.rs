//! Kokoro-82M TTS engine: single-model ONNX inference with misaki G2P.

mod download;
mod engine;
mod phonemize;

pub use engine::KokoroTts;
