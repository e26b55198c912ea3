//! Integration tests for the gemchat gateway HTTP surface.
//!
//! The remote model is replaced by a scripted client, so these tests cover
//! routing, session bookkeeping, media handling and error mapping without
//! network access.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use base64::Engine as _;
use gemchat_common::config::Config;
use gemchat_gateway::provider::{Conversation, FileRef, ModelClient, ProviderError, TurnPart};
use gemchat_gateway::routes::{
    ChatResponse, CleanupResponse, ErrorResponse, HealthResponse, NewChatResponse,
    SessionInfoResponse, SessionListResponse,
};
use gemchat_gateway::{build_router, build_router_with_state, AppState};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

// ─────────────────────────────────────────────────────────────────────────────
// Test Setup Helpers
// ─────────────────────────────────────────────────────────────────────────────

const BOUNDARY: &str = "gemchat-test-boundary";

/// Scripted model: echoes the first text part, fails when it contains "fail".
#[derive(Default)]
struct MockModel {
    turns: Mutex<Vec<Vec<&'static str>>>,
    uploads: Mutex<Vec<(String, String)>>,
}

impl MockModel {
    fn turns(&self) -> Vec<Vec<&'static str>> {
        self.turns.lock().unwrap().clone()
    }

    fn uploads(&self) -> Vec<(String, String)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for MockModel {
    fn model_name(&self) -> &str {
        "models/mock-model"
    }

    fn start_conversation(&self) -> Conversation {
        Conversation::new()
    }

    async fn send_turn(
        &self,
        conversation: &mut Conversation,
        parts: Vec<TurnPart>,
    ) -> Result<String, ProviderError> {
        let text = parts
            .iter()
            .find_map(|p| match p {
                TurnPart::Text(t) => Some(t.clone()),
                _ => None,
            })
            .unwrap_or_default();

        if text.contains("fail") {
            return Err(ProviderError {
                provider: "mock".into(),
                model: "mock-model".into(),
                message: "quota exceeded".into(),
                status_code: Some(429),
            });
        }

        self.turns
            .lock()
            .unwrap()
            .push(parts.iter().map(TurnPart::kind).collect());

        let reply = format!("echo: {text}");
        conversation.record(parts, &reply);
        Ok(reply)
    }

    async fn upload_file(
        &self,
        _bytes: Vec<u8>,
        mime_type: &str,
        display_name: &str,
    ) -> Result<FileRef, ProviderError> {
        self.uploads
            .lock()
            .unwrap()
            .push((display_name.to_string(), mime_type.to_string()));

        Ok(FileRef {
            name: "files/mock-1".into(),
            uri: "https://files.example/mock-1".into(),
            mime_type: mime_type.to_string(),
        })
    }
}

struct TestApp {
    router: Router,
    model: Arc<MockModel>,
    _frontend: TempDir,
}

fn test_config(frontend: &Path) -> Config {
    let mut config = Config::default();
    config.frontend.dir = frontend.to_path_buf();
    config
}

fn frontend_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("index.html"), "<html>gemchat frontend</html>").unwrap();
    std::fs::write(dir.path().join("app.js"), "console.log('gemchat');").unwrap();
    dir
}

fn setup() -> TestApp {
    setup_with(|_| {})
}

fn setup_with(configure: impl FnOnce(&mut Config)) -> TestApp {
    let frontend = frontend_dir();
    let mut config = test_config(frontend.path());
    configure(&mut config);

    let model = Arc::new(MockModel::default());
    let router = build_router(&config, model.clone());

    TestApp {
        router,
        model,
        _frontend: frontend,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn send_json<T: DeserializeOwned>(router: &Router, request: Request<Body>) -> (StatusCode, T) {
    let (status, body) = send(router, request).await;
    let parsed = serde_json::from_slice(&body)
        .unwrap_or_else(|e| panic!("bad body {}: {e}", String::from_utf8_lossy(&body)));
    (status, parsed)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_chat(body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_multipart(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/api/chat")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn png_bytes() -> Vec<u8> {
    let image = image::RgbImage::from_pixel(2, 2, image::Rgb([10, 20, 30]));
    let mut out = std::io::Cursor::new(Vec::new());
    image.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

async fn message_count(router: &Router, session_id: &str) -> Option<u64> {
    let (_, info): (_, SessionInfoResponse) =
        send_json(router, get(&format!("/api/session-info/{session_id}"))).await;
    info.message_count
}

// ─────────────────────────────────────────────────────────────────────────────
// Health & Static Info
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_reports_model_and_sessions() {
    let app = setup();

    let (status, health): (_, HealthResponse) = send_json(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health.status, "healthy");
    assert_eq!(health.active_sessions, 0);
    assert_eq!(health.model, "models/mock-model");
    assert!(chrono::DateTime::parse_from_rfc3339(&health.timestamp).is_ok());

    send(&app.router, post_empty("/api/new-chat")).await;
    let (_, health): (_, HealthResponse) = send_json(&app.router, get("/health")).await;
    assert_eq!(health.active_sessions, 1);
}

#[tokio::test]
async fn test_supported_formats() {
    let app = setup();

    let (status, formats): (_, Value) =
        send_json(&app.router, get("/api/supported-formats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(formats["max_file_size"], "50MB");

    let images = formats["image_formats"].as_array().unwrap();
    assert!(images.contains(&json!("png")));
    assert!(images.contains(&json!("webp")));
    let documents = formats["document_formats"].as_array().unwrap();
    assert!(documents.contains(&json!("pdf")));
    assert!(formats["audio_formats"].as_array().unwrap().contains(&json!("mp3")));
    assert!(formats["video_formats"].as_array().unwrap().contains(&json!("mp4")));
}

#[tokio::test]
async fn test_supported_formats_follows_upload_limit() {
    let app = setup_with(|c| c.uploads.max_content_length = 10 * 1024 * 1024);

    let (_, formats): (_, Value) = send_json(&app.router, get("/api/supported-formats")).await;
    assert_eq!(formats["max_file_size"], "10MB");
}

#[tokio::test]
async fn test_static_files_and_index_fallback() {
    let app = setup();

    let (status, body) = send(&app.router, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8_lossy(&body).contains("gemchat frontend"));

    let (status, body) = send(&app.router, get("/app.js")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8_lossy(&body).contains("console.log"));

    let (status, body) = send(&app.router, get("/chat/some/client/route")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8_lossy(&body).contains("gemchat frontend"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_new_chat_then_chat_counts_turn() {
    let app = setup();

    let (status, created): (_, NewChatResponse) =
        send_json(&app.router, post_empty("/api/new-chat")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created.status, "created");
    assert!(created.session_id.starts_with("session-"));

    let (status, reply): (_, ChatResponse) = send_json(
        &app.router,
        post_chat(json!({"message": "hello", "session_id": created.session_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply.response, "echo: hello");

    let (status, info): (_, SessionInfoResponse) = send_json(
        &app.router,
        get(&format!("/api/session-info/{}", created.session_id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(info.exists);
    assert_eq!(info.message_count, Some(1));
    assert!(info.created_at.is_some());
}

#[tokio::test]
async fn test_repeated_chats_increment_count() {
    let app = setup();

    for i in 0..3 {
        let (status, _): (_, ChatResponse) = send_json(
            &app.router,
            post_chat(json!({"message": format!("turn {i}"), "session_id": "s1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(message_count(&app.router, "s1").await, Some(3));
    assert_eq!(app.model.turns().len(), 3);
}

#[tokio::test]
async fn test_chat_without_session_id_uses_default() {
    let app = setup();

    let (status, _): (_, ChatResponse) =
        send_json(&app.router, post_chat(json!({"message": "hi"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message_count(&app.router, "default").await, Some(1));
}

#[tokio::test]
async fn test_unknown_session_info() {
    let app = setup();

    let (status, body): (_, Value) =
        send_json(&app.router, get("/api/session-info/nope")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"session_id": "nope", "exists": false}));
}

#[tokio::test]
async fn test_new_chat_id_is_fresh() {
    let app = setup();

    send(&app.router, post_empty("/api/new-chat")).await;
    send(&app.router, post_chat(json!({"message": "hi", "session_id": "named"}))).await;

    let (_, before): (_, SessionListResponse) =
        send_json(&app.router, get("/api/sessions")).await;
    assert_eq!(before.total_sessions, 2);

    let (_, created): (_, NewChatResponse) =
        send_json(&app.router, post_empty("/api/new-chat")).await;
    assert!(before
        .sessions
        .iter()
        .all(|s| s.session_id != created.session_id));
}

#[tokio::test]
async fn test_sessions_listed_newest_first() {
    let app = setup();

    let mut ids = Vec::new();
    for _ in 0..3 {
        let (_, created): (_, NewChatResponse) =
            send_json(&app.router, post_empty("/api/new-chat")).await;
        ids.push(created.session_id);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let (status, listing): (_, SessionListResponse) =
        send_json(&app.router, get("/api/sessions")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing.total_sessions, 3);

    let listed: Vec<String> = listing.sessions.into_iter().map(|s| s.session_id).collect();
    ids.reverse();
    assert_eq!(listed, ids);
}

#[tokio::test]
async fn test_cleanup_keeps_fresh_sessions() {
    let app = setup();

    send(&app.router, post_empty("/api/new-chat")).await;
    send(&app.router, post_empty("/api/new-chat")).await;

    let (status, cleanup): (_, CleanupResponse) =
        send_json(&app.router, post_empty("/api/cleanup-sessions")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleanup.cleaned_up, 0);
    assert_eq!(cleanup.remaining_sessions, 2);
}

#[tokio::test]
async fn test_cleanup_removes_expired_sessions() {
    let frontend = frontend_dir();
    let config = test_config(frontend.path());
    let mut state = AppState::new(&config, Arc::new(MockModel::default()));
    // a negative timeout puts the cutoff in the future
    state.session_timeout = chrono::Duration::seconds(-1);
    let router = build_router_with_state(&config, state);

    send(&router, post_empty("/api/new-chat")).await;
    send(&router, post_chat(json!({"message": "hi", "session_id": "old"}))).await;

    let (_, cleanup): (_, CleanupResponse) =
        send_json(&router, post_empty("/api/cleanup-sessions")).await;
    assert_eq!(cleanup.cleaned_up, 2);
    assert_eq!(cleanup.remaining_sessions, 0);

    let (_, info): (_, SessionInfoResponse) =
        send_json(&router, get("/api/session-info/old")).await;
    assert!(!info.exists);
}

// ─────────────────────────────────────────────────────────────────────────────
// Media
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_json_image_uses_default_prompt() {
    let app = setup();
    let encoded = base64::engine::general_purpose::STANDARD.encode(png_bytes());

    let (status, reply): (_, ChatResponse) = send_json(
        &app.router,
        post_chat(json!({
            "session_id": "img",
            "image": format!("data:image/png;base64,{encoded}"),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply.response, "echo: Please analyze this image.");
    assert_eq!(app.model.turns(), vec![vec!["text", "image"]]);
}

#[tokio::test]
async fn test_malformed_base64_is_rejected_without_counting() {
    let app = setup();

    let (status, error): (_, ErrorResponse) = send_json(
        &app.router,
        post_chat(json!({
            "message": "look",
            "session_id": "bad-img",
            "image": "data:image/png;base64,@@not-base64@@",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error.error.starts_with("Error processing image"));
    assert_eq!(message_count(&app.router, "bad-img").await, Some(0));
    assert!(app.model.turns().is_empty());
}

#[tokio::test]
async fn test_multipart_pdf_is_uploaded() {
    let app = setup();

    let (status, reply): (_, ChatResponse) = send_json(
        &app.router,
        post_multipart(&[("session_id", "docs")], Some(("report.pdf", &b"%PDF-1.4 fake"[..]))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply.response, "echo: Please analyze this file.");

    assert_eq!(
        app.model.uploads(),
        vec![("report.pdf".to_string(), "application/pdf".to_string())]
    );
    assert_eq!(app.model.turns(), vec![vec!["text", "file"]]);
    assert_eq!(message_count(&app.router, "docs").await, Some(1));
}

#[tokio::test]
async fn test_multipart_image_with_message() {
    let app = setup();
    let png = png_bytes();

    let (status, reply): (_, ChatResponse) = send_json(
        &app.router,
        post_multipart(
            &[("message", "what is this?"), ("session_id", "pics")],
            Some(("photo.png", png.as_slice())),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply.response, "echo: what is this?");
    assert_eq!(app.model.turns(), vec![vec!["text", "image"]]);
    assert!(app.model.uploads().is_empty());
}

#[tokio::test]
async fn test_unsupported_upload_is_rejected_without_counting() {
    let app = setup();

    let (status, error): (_, ErrorResponse) = send_json(
        &app.router,
        post_multipart(
            &[("message", "run this"), ("session_id", "exe")],
            Some(("tool.exe", &b"MZ\x90\x00"[..])),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error.error, "File type not supported");

    // the session is resolved before the file is checked
    assert_eq!(message_count(&app.router, "exe").await, Some(0));
    assert!(app.model.turns().is_empty());
    assert!(app.model.uploads().is_empty());
}

#[tokio::test]
async fn test_corrupt_image_upload_is_rejected() {
    let app = setup();

    let (status, error): (_, ErrorResponse) = send_json(
        &app.router,
        post_multipart(&[("session_id", "broken")], Some(("broken.jpg", &b"not an image"[..]))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error.error.starts_with("Error processing file"));
    assert_eq!(message_count(&app.router, "broken").await, Some(0));
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_missing_message_is_rejected() {
    let app = setup();

    let (status, error): (_, ErrorResponse) =
        send_json(&app.router, post_chat(json!({"session_id": "empty"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error.error, "No message provided");
    assert!(app.model.turns().is_empty());
}

#[tokio::test]
async fn test_invalid_json_is_rejected() {
    let app = setup();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, error): (_, ErrorResponse) = send_json(&app.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error.error.starts_with("Invalid JSON body"));
}

#[tokio::test]
async fn test_remote_failure_returns_500_without_counting() {
    let app = setup();

    send(&app.router, post_chat(json!({"message": "ok", "session_id": "r"}))).await;

    let (status, error): (_, ErrorResponse) = send_json(
        &app.router,
        post_chat(json!({"message": "please fail", "session_id": "r"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error.error, "quota exceeded");
    assert_eq!(message_count(&app.router, "r").await, Some(1));
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let app = setup_with(|c| c.uploads.max_content_length = 1024);

    let body = json!({"message": "x".repeat(4096)}).to_string();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .unwrap();

    let (status, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(app.model.turns().is_empty());
}

#[tokio::test]
async fn test_oversized_multipart_without_length_is_rejected() {
    let app = setup_with(|c| c.uploads.max_content_length = 1024);

    // no Content-Length header, so the limit trips while the body streams
    let request = post_multipart(&[("session_id", "big")], Some(("big.pdf", &[b'x'; 8192][..])));
    assert!(request.headers().get(header::CONTENT_LENGTH).is_none());

    let (status, error): (_, ErrorResponse) = send_json(&app.router, request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(!error.error.is_empty());
    assert!(app.model.turns().is_empty());
    assert!(app.model.uploads().is_empty());
}
