//! Request orchestrator: audio in → transcript → reply text → audio out.
//!
//! One [`ConversationPipeline::process`] call handles one conversational
//! turn end to end. The pipeline holds no per-conversation state; the caller
//! supplies the history on every request.

use crate::config::SpeechConfig;
use crate::error::{Result, SpeechError};
use crate::llm::prompt::{build_messages, parse_history};
use crate::llm::{ProficiencyLevel, ReplyGenerator};
use crate::stt::Transcriber;
use crate::tts::Synthesizer;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Result of a successfully handled turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing intelligible was heard; no reply was generated.
    EmptyTranscription,
    /// The full turn completed.
    Reply(Reply),
}

/// A completed conversational turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// What the user said.
    pub transcription: String,
    /// What the assistant answered.
    pub response_text: String,
    /// Root-relative URL of the synthesized answer, e.g.
    /// `/audio_files/response_<uuid>.wav`.
    pub audio_path: String,
}

/// Chains the three model adapters for one request at a time.
///
/// Cheap to clone; the adapters are shared behind `Arc`.
#[derive(Clone)]
pub struct ConversationPipeline {
    transcriber: Arc<dyn Transcriber>,
    generator: Arc<dyn ReplyGenerator>,
    synthesizer: Arc<dyn Synthesizer>,
    temp_dir: PathBuf,
    audio_dir: PathBuf,
    audio_url_prefix: String,
    history_limit: usize,
}

impl ConversationPipeline {
    /// Build a pipeline over the given adapters, taking directories and the
    /// history window from `config`.
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        generator: Arc<dyn ReplyGenerator>,
        synthesizer: Arc<dyn Synthesizer>,
        config: &SpeechConfig,
    ) -> Self {
        Self {
            transcriber,
            generator,
            synthesizer,
            temp_dir: config.server.temp_dir.clone(),
            audio_dir: config.server.audio_dir.clone(),
            audio_url_prefix: config.server.audio_url_prefix.trim_end_matches('/').to_owned(),
            history_limit: config.llm.history_limit,
        }
    }

    /// Directory that synthesized replies are written to.
    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    /// URL prefix under which [`Self::audio_dir`] is served.
    pub fn audio_url_prefix(&self) -> &str {
        &self.audio_url_prefix
    }

    /// Handle one conversational turn.
    ///
    /// `history_json` is the caller-held conversation as a JSON array of
    /// `[user, assistant]` pairs.
    ///
    /// # Errors
    ///
    /// Any failure while saving the upload, transcribing, parsing history,
    /// generating or synthesizing. The error has already been logged.
    pub async fn process(
        &self,
        audio: Bytes,
        level: ProficiencyLevel,
        history_json: &str,
    ) -> Result<Outcome> {
        let result = self.run(audio, level, history_json).await;
        if let Err(e) = &result {
            error!("error processing speech: {e}");
        }
        result
    }

    async fn run(
        &self,
        audio: Bytes,
        level: ProficiencyLevel,
        history_json: &str,
    ) -> Result<Outcome> {
        let started = Instant::now();

        // The upload guard drops at the end of this block, so the input file
        // is gone before generation starts.
        let transcription = {
            let upload = TempAudioFile::write(&self.temp_dir, &audio).await?;
            let stage = Instant::now();
            let text = self.transcriber.transcribe(upload.path()).await?;
            info!("transcription stage took {}ms", stage.elapsed().as_millis());
            text
        };

        if transcription.trim().is_empty() {
            warn!("empty transcription, skipping reply");
            return Ok(Outcome::EmptyTranscription);
        }

        let history = parse_history(history_json)?;
        let messages = build_messages(&transcription, &history, level, self.history_limit);
        debug!(
            "prompting with {} of {} turns at {level} level",
            (messages.len() - 2) / 2,
            history.len()
        );

        let stage = Instant::now();
        let response_text = self.generator.generate(&messages).await?;
        info!("generated reply in {}ms", stage.elapsed().as_millis());

        let file_name = format!("response_{}.wav", Uuid::new_v4());
        let output = self.audio_dir.join(&file_name);
        let stage = Instant::now();
        if let Err(e) = self
            .synthesizer
            .synthesize_to_file(&response_text, &output)
            .await
        {
            // Never leave a half-written reply in the served directory.
            if output.exists()
                && let Err(rm) = tokio::fs::remove_file(&output).await
            {
                warn!("failed to remove {}: {rm}", output.display());
            }
            return Err(e);
        }
        info!(
            "synthesized {} in {}ms",
            output.display(),
            stage.elapsed().as_millis()
        );

        info!("turn complete in {}ms", started.elapsed().as_millis());
        Ok(Outcome::Reply(Reply {
            transcription,
            response_text,
            audio_path: format!("{}/{file_name}", self.audio_url_prefix),
        }))
    }
}

/// Uploaded audio saved under a unique name, removed when dropped.
struct TempAudioFile {
    path: PathBuf,
}

impl TempAudioFile {
    async fn write(dir: &Path, contents: &[u8]) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("temp_{}.wav", Uuid::new_v4()));
        // Guard first so a partial write is still cleaned up.
        let guard = Self { path };
        tokio::fs::write(&guard.path, contents).await?;
        Ok(guard)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempAudioFile {
    fn drop(&mut self) {
        if !self.path.exists() {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("failed to remove {}: {e}", self.path.display());
        }
    }
}
