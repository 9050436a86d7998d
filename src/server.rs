//! HTTP surface for the conversation pipeline.
//!
//! ## Endpoints
//!
//! - `POST /process_speech`: multipart `audio` + `level` (+ optional `history`)
//! - `GET /`: status message
//! - `GET {audio_url_prefix}/*`: synthesized reply audio

use crate::config::ServerConfig;
use crate::error::{Result, SpeechError};
use crate::llm::ProficiencyLevel;
use crate::pipeline::{ConversationPipeline, Outcome};
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Status line returned by `GET /`.
pub const STATUS_MESSAGE: &str =
    "Speakwell API is running. Connect your frontend to start practicing!";

/// Error text for a recording in which no speech was recognized.
pub const EMPTY_TRANSCRIPTION_MESSAGE: &str = "Could not transcribe speech. Please try again.";

/// History used when the request carries none.
const EMPTY_HISTORY: &str = "[]";

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Body of a successful `POST /process_speech`.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSpeechResponse {
    pub transcription: String,
    pub response_text: String,
    pub audio_path: String,
}

/// JSON error reply: `{"error": "<message>"}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<SpeechError> for ApiError {
    fn from(err: SpeechError) -> Self {
        ApiError::internal(format!("Error processing speech: {err}"))
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(err: MultipartRejection) -> Self {
        ApiError::bad_request(format!("Invalid multipart payload: {err}"))
    }
}

/// Keeps axum's status, so a body over the upload limit is a 413.
fn multipart_error(context: &str, err: MultipartError) -> ApiError {
    ApiError {
        status: err.status(),
        message: format!("{context}: {}", err.body_text()),
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the application router.
///
/// # Errors
///
/// Returns [`SpeechError::Config`] if the CORS origin is not a valid header
/// value or the audio URL prefix is the site root.
pub fn router(pipeline: ConversationPipeline, config: &ServerConfig) -> Result<Router> {
    let origin = HeaderValue::from_str(&config.cors_origin).map_err(|e| {
        SpeechError::Config(format!(
            "server.cors_origin {:?} is not a valid origin: {e}",
            config.cors_origin
        ))
    })?;
    // Credentials rule out wildcards, so methods and headers are mirrored.
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    let prefix = pipeline.audio_url_prefix().to_owned();
    if prefix.is_empty() {
        return Err(SpeechError::Config(
            "server.audio_url_prefix must not be the site root".to_owned(),
        ));
    }
    let audio_files = ServeDir::new(pipeline.audio_dir());

    Ok(Router::new()
        .route("/", get(handle_root))
        .route("/process_speech", post(handle_process_speech))
        .nest_service(&prefix, audio_files)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(pipeline))
}

async fn handle_root() -> Json<serde_json::Value> {
    Json(json!({ "message": STATUS_MESSAGE }))
}

async fn handle_process_speech(
    State(pipeline): State<ConversationPipeline>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<Json<ProcessSpeechResponse>, ApiError> {
    let form = read_form(multipart?).await?;
    info!(
        "speech request: {} bytes, level={}",
        form.audio.len(),
        form.level
    );

    let history = form.history.as_deref().unwrap_or(EMPTY_HISTORY);
    match pipeline.process(form.audio, form.level, history).await? {
        Outcome::EmptyTranscription => Err(ApiError::bad_request(EMPTY_TRANSCRIPTION_MESSAGE)),
        Outcome::Reply(reply) => Ok(Json(ProcessSpeechResponse {
            transcription: reply.transcription,
            response_text: reply.response_text,
            audio_path: reply.audio_path,
        })),
    }
}

/// Fields of a `POST /process_speech` form.
struct SpeechForm {
    audio: Bytes,
    level: ProficiencyLevel,
    history: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> std::result::Result<SpeechForm, ApiError> {
    let mut audio: Option<Bytes> = None;
    let mut level: Option<String> = None;
    let mut history: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Failed reading multipart field", e))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "audio" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error("Failed reading multipart 'audio' field", e))?;
                audio = Some(bytes);
            }
            "level" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| multipart_error("Failed reading multipart 'level' field", e))?;
                level = Some(text);
            }
            "history" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| multipart_error("Failed reading multipart 'history' field", e))?;
                if !text.trim().is_empty() {
                    history = Some(text);
                }
            }
            _ => {}
        }
    }

    let audio = audio.ok_or_else(|| ApiError::bad_request("Missing multipart 'audio' field"))?;
    let level = level.ok_or_else(|| ApiError::bad_request("Missing multipart 'level' field"))?;

    Ok(SpeechForm {
        audio,
        level: ProficiencyLevel::resolve(&level),
        history,
    })
}

// ---------------------------------------------------------------------------
// SpeechServer
// ---------------------------------------------------------------------------

/// The conversation API served in a background task.
pub struct SpeechServer {
    /// The address the server is listening on.
    addr: SocketAddr,
    /// Handle to the background server task.
    handle: JoinHandle<()>,
}

impl SpeechServer {
    /// Start serving.
    ///
    /// Binds to `{config.host}:{config.port}` (use port `0` for auto-assign)
    /// and begins serving in a background tokio task.
    ///
    /// # Errors
    ///
    /// Returns an error if the router cannot be built or the listener cannot bind.
    pub async fn start(pipeline: ConversationPipeline, config: &ServerConfig) -> Result<Self> {
        let app = router(pipeline, config)?;

        let bind_addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            SpeechError::Config(format!("failed to bind {bind_addr}: {e}"))
        })?;
        let addr = listener.local_addr()?;

        info!("listening on http://{addr}");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("server error: {e}");
            }
        });

        Ok(Self { addr, handle })
    }

    /// Returns the address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Abort the server task.
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for SpeechServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn bad_request_maps_to_400() {
        let response = ApiError::bad_request(EMPTY_TRANSCRIPTION_MESSAGE).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn pipeline_errors_map_to_internal_with_prefix() {
        let err = ApiError::from(SpeechError::Llm("connection refused".into()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.message,
            "Error processing speech: LLM error: connection refused"
        );
    }
}
