//! Text-to-speech synthesis.
//!
//! [`Synthesizer`] is the seam the request pipeline depends on; [`KokoroTts`]
//! renders speech with the Kokoro-82M ONNX model at 24 kHz and writes it to
//! a WAV file.

mod kokoro;

pub use kokoro::KokoroTts;

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Renders reply text as an audio file.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` and write a single audio file at `output`.
    ///
    /// The file is complete when this returns `Ok`.
    async fn synthesize_to_file(&self, text: &str, output: &Path) -> Result<()>;
}

/// Split text into sentence-sized chunks for synthesis.
///
/// Splits after `.`, `!`, `?` or a newline when followed by whitespace or end
/// of text. Chunks are trimmed; blank chunks are dropped.
pub(crate) fn split_sentences(text: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?' | '\n') {
            continue;
        }
        let at_boundary = chars.peek().is_none_or(|&(_, next)| next.is_whitespace());
        if at_boundary {
            let end = i + c.len_utf8();
            let chunk = text[start..end].trim();
            if !chunk.is_empty() {
                chunks.push(chunk);
            }
            start = end;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        chunks.push(tail);
    }
    chunks
}
