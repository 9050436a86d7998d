//! Speakwell: spoken-conversation practice server.
//!
//! One HTTP request carries one conversational turn through a cascaded
//! pipeline:
//! Uploaded audio → STT → LLM → TTS → Audio file URL
//!
//! # Architecture
//!
//! - **STT**: Transcribes speech using NVIDIA Parakeet TDT
//! - **LLM**: Generates tutor replies through an OpenAI-compatible server
//! - **TTS**: Synthesizes speech using Kokoro-82M (ONNX)
//! - **Server**: `axum` router exposing the pipeline and serving reply audio
//!
//! Each model sits behind a one-method trait ([`stt::Transcriber`],
//! [`llm::ReplyGenerator`], [`tts::Synthesizer`]) so the pipeline can run
//! against any implementation.

pub mod audio;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod server;
pub mod startup;
pub mod stt;
pub mod tts;

pub use config::SpeechConfig;
pub use error::{Result, SpeechError};
pub use pipeline::{ConversationPipeline, Outcome, Reply};
pub use server::SpeechServer;
pub use startup::InitializedModels;
