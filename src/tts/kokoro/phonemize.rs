//! Misaki G2P (grapheme-to-phoneme) wrapper for Kokoro.
//!
//! LLM replies often carry markdown and typographic punctuation that G2P
//! would either read aloud or choke on, so text is normalized first.

use crate::error::{Result, SpeechError};

/// Thin wrapper around `misaki-rs` G2P for phonemization.
pub struct Phonemizer {
    g2p: misaki_rs::G2P,
}

impl Phonemizer {
    /// Create a phonemizer for British (`true`) or American English.
    pub fn new(british: bool) -> Self {
        let lang = if british {
            misaki_rs::Language::EnglishGB
        } else {
            misaki_rs::Language::EnglishUS
        };
        Self {
            g2p: misaki_rs::G2P::new(lang),
        }
    }

    /// Convert text to a phoneme string for Kokoro's tokenizer.
    ///
    /// Returns an empty string when normalization leaves nothing to speak.
    ///
    /// # Errors
    ///
    /// Returns an error if phonemization fails.
    pub fn phonemize(&self, text: &str) -> Result<String> {
        let normalized = normalize_text(text);
        if normalized.trim().is_empty() {
            return Ok(String::new());
        }
        let (phonemes, _tokens) = self
            .g2p
            .g2p(&normalized)
            .map_err(|e| SpeechError::Tts(format!("phonemization failed: {e}")))?;
        Ok(phonemes)
    }
}

/// Normalize text for pronunciation.
///
/// Replaces curly quotes and long dashes with ASCII, drops markdown emphasis
/// markers, heading hashes and list bullets, and collapses whitespace.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let line = strip_line_markup(line);
        for ch in line.chars() {
            match ch {
                '\u{2018}' | '\u{2019}' => out.push('\''),
                '\u{201C}' | '\u{201D}' => out.push('"'),
                '\u{2013}' | '\u{2014}' => out.push_str(" - "),
                '*' | '_' | '`' => {}
                _ => out.push(ch),
            }
        }
        out.push(' ');
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove heading hashes and bullet markers at the start of a line.
fn strip_line_markup(line: &str) -> &str {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix('#') {
        return rest.trim_start_matches('#').trim_start();
    }
    for bullet in ["- ", "+ ", "* "] {
        if let Some(rest) = trimmed.strip_prefix(bullet) {
            return rest;
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn smart_quotes_become_ascii() {
        assert_eq!(
            normalize_text("\u{201C}I\u{2019}m here\u{201D}"),
            "\"I'm here\""
        );
    }

    #[test]
    fn dashes_are_spaced_hyphens() {
        assert_eq!(normalize_text("well\u{2014}maybe"), "well - maybe");
    }

    #[test]
    fn markdown_markers_are_removed() {
        assert_eq!(
            normalize_text("## Tip\n**Great** job, _really_!"),
            "Tip Great job, really!"
        );
    }

    #[test]
    fn bullets_are_removed() {
        assert_eq!(
            normalize_text("Try these:\n- apple\n* banana"),
            "Try these: apple banana"
        );
    }

    #[test]
    fn plain_text_is_unchanged() {
        let input = "Plain text with nothing to normalize.";
        assert_eq!(normalize_text(input), input);
    }

    #[test]
    fn empty_text_stays_empty() {
        assert_eq!(normalize_text(""), "");
    }
}
