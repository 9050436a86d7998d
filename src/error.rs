//! Error types for the speakwell pipeline.

/// Top-level error type for the conversation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    /// Audio decoding or WAV writing error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text transcription error.
    #[error("STT error: {0}")]
    Stt(String),

    /// Language model inference error.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Text-to-speech synthesis error.
    #[error("TTS error: {0}")]
    Tts(String),

    /// Model download or loading error.
    #[error("model error: {0}")]
    Model(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Conversation history could not be parsed.
    #[error("history error: {0}")]
    History(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, SpeechError>;
