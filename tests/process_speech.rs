//! Router-level tests for the conversation API.
//!
//! The three model adapters are replaced with in-memory fakes so the full
//! HTTP path (multipart parsing, pipeline, status mapping, static audio
//! serving, CORS) runs without any model weights.

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use speakwell::config::SpeechConfig;
use speakwell::llm::{ChatMessage, ProficiencyLevel, ReplyGenerator, Role};
use speakwell::stt::Transcriber;
use speakwell::tts::Synthesizer;
use speakwell::{ConversationPipeline, SpeechError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

const BOUNDARY: &str = "speakwell-test-boundary";
const FAKE_AUDIO: &[u8] = b"RIFF\x24\x00\x00\x00WAVEfmt ";
const REPLY: &str = "That sounds wonderful! What did you cook?";

// ────────────────────────────────────────────────────────────────────────────
// Fakes
// ────────────────────────────────────────────────────────────────────────────

struct FakeStt {
    text: String,
    fail: bool,
}

#[async_trait]
impl Transcriber for FakeStt {
    async fn transcribe(&self, path: &Path) -> speakwell::Result<String> {
        assert!(path.exists(), "upload should exist while transcribing");
        if self.fail {
            return Err(SpeechError::Stt("unsupported codec: opus".into()));
        }
        Ok(self.text.clone())
    }
}

#[derive(Default)]
struct FakeLlm {
    fail: bool,
    calls: AtomicUsize,
    last: Mutex<Vec<ChatMessage>>,
}

#[async_trait]
impl ReplyGenerator for FakeLlm {
    async fn generate(&self, messages: &[ChatMessage]) -> speakwell::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = messages.to_vec();
        if self.fail {
            return Err(SpeechError::Llm("connection refused".into()));
        }
        Ok(REPLY.to_owned())
    }
}

#[derive(Default)]
struct FakeTts {
    fail: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl Synthesizer for FakeTts {
    async fn synthesize_to_file(&self, text: &str, output: &Path) -> speakwell::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SpeechError::Tts("voice style missing".into()));
        }
        std::fs::write(output, fake_wav(text))?;
        Ok(())
    }
}

fn fake_wav(text: &str) -> Vec<u8> {
    let mut bytes = b"RIFF-fake-".to_vec();
    bytes.extend_from_slice(text.as_bytes());
    bytes
}

// ────────────────────────────────────────────────────────────────────────────
// Harness
// ────────────────────────────────────────────────────────────────────────────

struct App {
    _dir: tempfile::TempDir,
    temp_dir: PathBuf,
    audio_dir: PathBuf,
    router: Router,
    llm: Arc<FakeLlm>,
    tts: Arc<FakeTts>,
}

fn app(transcript: &str, llm: FakeLlm) -> App {
    AppBuilder::new(transcript).llm(llm).build()
}

struct AppBuilder {
    stt: FakeStt,
    llm: FakeLlm,
    tts: FakeTts,
    max_upload_bytes: Option<usize>,
}

impl AppBuilder {
    fn new(transcript: &str) -> Self {
        Self {
            stt: FakeStt {
                text: transcript.to_owned(),
                fail: false,
            },
            llm: FakeLlm::default(),
            tts: FakeTts::default(),
            max_upload_bytes: None,
        }
    }

    fn llm(mut self, llm: FakeLlm) -> Self {
        self.llm = llm;
        self
    }

    fn failing_stt(mut self) -> Self {
        self.stt.fail = true;
        self
    }

    fn failing_tts(mut self) -> Self {
        self.tts.fail = true;
        self
    }

    fn max_upload_bytes(mut self, limit: usize) -> Self {
        self.max_upload_bytes = Some(limit);
        self
    }

    fn build(self) -> App {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SpeechConfig::default();
        config.llm.model = "test-model".to_owned();
        config.server.temp_dir = dir.path().join("tmp");
        config.server.audio_dir = dir.path().join("audio_files");
        if let Some(limit) = self.max_upload_bytes {
            config.server.max_upload_bytes = limit;
        }
        std::fs::create_dir_all(&config.server.temp_dir).unwrap();
        std::fs::create_dir_all(&config.server.audio_dir).unwrap();

        let stt = Arc::new(self.stt);
        let llm = Arc::new(self.llm);
        let tts = Arc::new(self.tts);
        let pipeline = ConversationPipeline::new(stt, llm.clone(), tts.clone(), &config);
        let router = speakwell::server::router(pipeline, &config.server).unwrap();

        App {
            _dir: dir,
            temp_dir: config.server.temp_dir,
            audio_dir: config.server.audio_dir,
            router,
            llm,
            tts,
        }
    }
}

fn multipart_body(audio: Option<&[u8]>, level: Option<&str>, history: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(audio) = audio {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"audio\"; \
                 filename=\"recording.wav\"\r\nContent-Type: audio/wav\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(audio);
        body.extend_from_slice(b"\r\n");
    }
    for (name, value) in [("level", level), ("history", history)] {
        if let Some(value) = value {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n\
                     {value}\r\n"
                )
                .as_bytes(),
            );
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn speech_request(level: &str, history: Option<&str>) -> Request<Body> {
    raw_speech_request(multipart_body(Some(FAKE_AUDIO), Some(level), history))
}

fn raw_speech_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/process_speech")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

async fn send_json(router: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let (status, bytes) = send(router, request).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn temp_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

fn history_json(turns: usize) -> String {
    let pairs: Vec<(String, String)> = (0..turns)
        .map(|i| (format!("user {i}"), format!("assistant {i}")))
        .collect();
    serde_json::to_string(&pairs).unwrap()
}

// ────────────────────────────────────────────────────────────────────────────
// POST /process_speech
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn valid_audio_returns_transcript_reply_and_audio_path() {
    let app = app("I cooked pasta yesterday.", FakeLlm::default());

    let (status, body) = send_json(&app.router, speech_request("Intermediate", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transcription"], "I cooked pasta yesterday.");
    assert_eq!(body["response_text"], REPLY);
    let audio_path = body["audio_path"].as_str().unwrap();
    assert!(audio_path.starts_with("/audio_files/response_"), "{audio_path}");
    assert!(audio_path.ends_with(".wav"), "{audio_path}");
}

#[tokio::test]
async fn returned_audio_path_serves_synthesized_bytes() {
    let app = app("Hello there", FakeLlm::default());

    let (_, body) = send_json(&app.router, speech_request("Beginner", None)).await;
    let audio_path = body["audio_path"].as_str().unwrap().to_owned();

    let request = Request::builder()
        .uri(audio_path.as_str())
        .body(Body::empty())
        .unwrap();
    let (status, bytes) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, fake_wav(REPLY));
}

#[tokio::test]
async fn empty_transcription_is_bad_request_without_reply() {
    let app = app("  ", FakeLlm::default());

    let (status, body) = send_json(&app.router, speech_request("Advanced", None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Could not transcribe speech. Please try again.");
    assert_eq!(app.llm.calls.load(Ordering::SeqCst), 0);
    assert_eq!(app.tts.calls.load(Ordering::SeqCst), 0);
    assert_eq!(temp_files(&app.temp_dir), 0);
}

#[tokio::test]
async fn only_last_ten_turns_are_forwarded() {
    let app = app("And today?", FakeLlm::default());
    let history = history_json(15);

    let (status, _) = send_json(&app.router, speech_request("Advanced", Some(&history))).await;
    assert_eq!(status, StatusCode::OK);

    let messages = app.llm.last.lock().unwrap().clone();
    // system + 10 pairs + new message
    assert_eq!(messages.len(), 22);
    assert_eq!(messages[0].role, Role::System);
    for (i, pair) in messages[1..21].chunks(2).enumerate() {
        assert_eq!(pair[0], ChatMessage::new(Role::User, format!("user {}", i + 5)));
        assert_eq!(
            pair[1],
            ChatMessage::new(Role::Assistant, format!("assistant {}", i + 5))
        );
    }
    assert_eq!(messages[21], ChatMessage::new(Role::User, "And today?"));
}

#[tokio::test]
async fn level_selects_matching_instruction() {
    let cases = [
        ("Beginner", ProficiencyLevel::Beginner),
        ("Intermediate", ProficiencyLevel::Intermediate),
        ("Advanced", ProficiencyLevel::Advanced),
        ("intermediate", ProficiencyLevel::Advanced),
        ("Expert", ProficiencyLevel::Advanced),
    ];

    for (raw, expected) in cases {
        let app = app("Hello", FakeLlm::default());
        let (status, _) = send_json(&app.router, speech_request(raw, None)).await;
        assert_eq!(status, StatusCode::OK, "level {raw}");

        let messages = app.llm.last.lock().unwrap().clone();
        assert!(
            messages[0].content.ends_with(expected.instruction()),
            "level {raw} produced system prompt: {}",
            messages[0].content
        );
    }
}

#[tokio::test]
async fn temp_upload_removed_after_success() {
    let app = app("Hello", FakeLlm::default());

    let (status, _) = send_json(&app.router, speech_request("Beginner", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(temp_files(&app.temp_dir), 0);
}

#[tokio::test]
async fn generator_failure_is_server_error_and_removes_upload() {
    let app = app(
        "Hello",
        FakeLlm {
            fail: true,
            ..FakeLlm::default()
        },
    );

    let (status, body) = send_json(&app.router, speech_request("Beginner", None)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("Error processing speech: "), "{error}");
    assert!(error.contains("connection refused"), "{error}");
    assert_eq!(app.tts.calls.load(Ordering::SeqCst), 0);
    assert_eq!(temp_files(&app.temp_dir), 0);
}

#[tokio::test]
async fn transcriber_failure_is_server_error_and_skips_generation() {
    let app = AppBuilder::new("Hello").failing_stt().build();

    let (status, body) = send_json(&app.router, speech_request("Beginner", None)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("Error processing speech: "), "{error}");
    assert!(error.contains("unsupported codec"), "{error}");
    assert_eq!(app.llm.calls.load(Ordering::SeqCst), 0);
    assert_eq!(app.tts.calls.load(Ordering::SeqCst), 0);
    assert_eq!(temp_files(&app.temp_dir), 0);
}

#[tokio::test]
async fn synthesizer_failure_is_server_error_without_reply_audio() {
    let app = AppBuilder::new("Hello").failing_tts().build();

    let (status, body) = send_json(&app.router, speech_request("Advanced", None)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("Error processing speech: "), "{error}");
    assert!(error.contains("voice style missing"), "{error}");
    assert!(body.get("audio_path").is_none());
    assert_eq!(app.llm.calls.load(Ordering::SeqCst), 1);
    assert_eq!(temp_files(&app.temp_dir), 0);
    assert_eq!(temp_files(&app.audio_dir), 0);
}

#[tokio::test]
async fn oversized_upload_is_payload_too_large() {
    let app = AppBuilder::new("Hello").max_upload_bytes(1024).build();

    let big_audio = vec![0u8; 8 * 1024];
    let request = raw_speech_request(multipart_body(Some(&big_audio), Some("Beginner"), None));
    let (status, body) = send_json(&app.router, request).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["error"].is_string());
    assert_eq!(app.llm.calls.load(Ordering::SeqCst), 0);
    assert_eq!(temp_files(&app.temp_dir), 0);
}

#[tokio::test]
async fn malformed_history_is_server_error_and_server_keeps_serving() {
    let app = app("Hello", FakeLlm::default());

    let (status, body) =
        send_json(&app.router, speech_request("Beginner", Some("not-json"))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .starts_with("Error processing speech: ")
    );
    assert_eq!(app.llm.calls.load(Ordering::SeqCst), 0);

    let (status, _) = send_json(&app.router, speech_request("Beginner", None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn missing_audio_field_is_bad_request() {
    let app = app("Hello", FakeLlm::default());

    let request = raw_speech_request(multipart_body(None, Some("Beginner"), None));
    let (status, body) = send_json(&app.router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("audio"));
    assert_eq!(app.llm.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_level_field_is_bad_request() {
    let app = app("Hello", FakeLlm::default());

    let request = raw_speech_request(multipart_body(Some(FAKE_AUDIO), None, None));
    let (status, body) = send_json(&app.router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("level"));
}

#[tokio::test]
async fn non_multipart_body_is_bad_request() {
    let app = app("Hello", FakeLlm::default());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/process_speech")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, body) = send_json(&app.router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

// ────────────────────────────────────────────────────────────────────────────
// Other routes
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn root_reports_running() {
    let app = app("Hello", FakeLlm::default());

    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let (status, body) = send_json(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("API is running"));
}

#[tokio::test]
async fn cors_allows_only_configured_origin_with_credentials() {
    let app = app("Hello", FakeLlm::default());

    let preflight = |origin: &str| {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/process_speech")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap()
    };

    let response = app
        .router
        .clone()
        .oneshot(preflight("http://localhost:5173"))
        .await
        .unwrap();
    let headers = response.headers();
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "http://localhost:5173"
    );
    assert_eq!(
        headers
            .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
            .unwrap(),
        "true"
    );

    let response = app
        .router
        .clone()
        .oneshot(preflight("http://evil.example"))
        .await
        .unwrap();
    assert!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none()
    );
}
