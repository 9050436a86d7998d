//! OpenAI-compatible API backend for reply generation.
//!
//! Supports any server implementing the OpenAI chat completions API:
//! - vLLM (`vllm serve Qwen/Qwen2.5-14B-Instruct`)
//! - llama.cpp server, Ollama, etc.
//!
//! The server renders the message list through the served model's chat
//! template, so the prompt format always matches the model.

use super::{ChatMessage, ReplyGenerator, strip_think_blocks};
use crate::config::LlmConfig;
use crate::error::{Result, SpeechError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Request body for `POST /v1/chat/completions`.
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    top_p: f64,
    /// Not part of the OpenAI schema; vLLM and llama.cpp accept it as an extension.
    repetition_penalty: f32,
    max_tokens: usize,
    n: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Reply generator backed by an OpenAI-compatible HTTP API.
pub struct ApiLlm {
    config: LlmConfig,
    url: String,
    client: reqwest::Client,
}

impl ApiLlm {
    /// Create a new API-based generator.
    ///
    /// No request is made until [`ReplyGenerator::generate`] is called.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| SpeechError::Llm(format!("HTTP client init failed: {e}")))?;
        let url = completions_url(&config.api_url);

        info!("API LLM configured: {url} model={}", config.model);

        Ok(Self {
            config: config.clone(),
            url,
            client,
        })
    }

    fn request_body<'a>(&'a self, messages: &'a [ChatMessage]) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            repetition_penalty: self.config.repetition_penalty,
            max_tokens: self.config.max_tokens,
            n: 1,
            stream: false,
        }
    }
}

#[async_trait]
impl ReplyGenerator for ApiLlm {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let start = Instant::now();
        debug!("sending {} messages to {}", messages.len(), self.url);

        let mut request = self.client.post(&self.url).json(&self.request_body(messages));
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SpeechError::Llm(format!("API request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Llm(format!(
                "API returned {status}: {}",
                body.trim()
            )));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::Llm(format!("invalid API response: {e}")))?;

        let raw: String = parsed
            .choices
            .into_iter()
            .take(1)
            .filter_map(|c| c.message.content)
            .collect();
        let reply = strip_think_blocks(&raw).trim().to_owned();

        info!(
            "generated {} chars in {:.1}s",
            reply.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(reply)
    }
}

/// Normalize a base URL into the chat completions endpoint.
///
/// Accepts the base with or without a trailing `/v1` or slash.
fn completions_url(api_url: &str) -> String {
    let base = api_url.trim_end_matches('/');
    let base = base.strip_suffix("/v1").unwrap_or(base);
    format!("{base}/v1/chat/completions")
}
