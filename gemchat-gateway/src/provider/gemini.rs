//! Google Gemini client.
//!
//! Uses the `generateContent` REST endpoint for turns and the Files API
//! media upload for non-image attachments. The REST API is stateless, so the
//! conversation history is replayed with every request.

use super::{Conversation, FileRef, ModelClient, ProviderError, Role, TurnPart};
use async_trait::async_trait;
use base64::Engine;
use gemchat_common::config::ModelConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;

const PROVIDER: &str = "gemini";
const CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Gemini REST client bound to one model.
pub struct GeminiClient {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

// ══════════════════════════════════════════════════════════════════════════════
// API REQUEST/RESPONSE TYPES
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: Blob },
    FileData { file_data: FileData },
}

#[derive(Debug, Serialize)]
struct Blob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedFile {
    name: String,
    uri: String,
    mime_type: Option<String>,
}

impl GeminiClient {
    /// Create a client for `model` (with or without the `models/` prefix).
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let model = if model.starts_with("models/") {
            model
        } else {
            format!("models/{model}")
        };

        Self {
            api_key: api_key.into(),
            model,
            base_url: "https://generativelanguage.googleapis.com".into(),
            client: build_http_client(),
        }
    }

    /// Create a client from the model section of the configuration.
    pub fn from_config(config: &ModelConfig) -> gemchat_common::Result<Self> {
        let api_key = config.api_key().ok_or_else(|| {
            gemchat_common::Error::Config("GOOGLE_API_KEY environment variable not set".into())
        })?;

        Ok(Self::new(api_key, config.name.clone()).with_base_url(&config.base_url))
    }

    /// Point the client at a different API root.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Self {
        self.base_url = base_url.as_ref().trim_end_matches('/').to_string();
        self
    }

    fn error(&self, message: impl Into<String>, status_code: Option<u16>) -> ProviderError {
        ProviderError {
            provider: PROVIDER.into(),
            model: self.model.clone(),
            message: message.into(),
            status_code,
        }
    }

    fn to_part(part: &TurnPart) -> Part {
        match part {
            TurnPart::Text(text) => Part::Text { text: text.clone() },
            TurnPart::Image { mime_type, data } => Part::InlineData {
                inline_data: Blob {
                    mime_type: mime_type.clone(),
                    data: base64::engine::general_purpose::STANDARD.encode(data),
                },
            },
            TurnPart::File(file) => Part::FileData {
                file_data: FileData {
                    mime_type: file.mime_type.clone(),
                    file_uri: file.uri.clone(),
                },
            },
        }
    }

    fn to_content(role: Role, parts: &[TurnPart]) -> Content {
        Content {
            role: match role {
                Role::User => "user",
                Role::Model => "model",
            },
            parts: parts.iter().map(Self::to_part).collect(),
        }
    }

    fn build_request(conversation: &Conversation, parts: &[TurnPart]) -> GenerateContentRequest {
        let mut contents: Vec<Content> = conversation
            .history()
            .iter()
            .map(|exchange| Self::to_content(exchange.role, &exchange.parts))
            .collect();
        contents.push(Self::to_content(Role::User, parts));

        GenerateContentRequest { contents }
    }

    fn extract_text(&self, result: GenerateContentResponse) -> Result<String, ProviderError> {
        if let Some(err) = result.error {
            return Err(self.error(format!("API error: {}", err.message), None));
        }

        let candidate = match result.candidates.and_then(|c| c.into_iter().next()) {
            Some(candidate) => candidate,
            None => {
                let reason = result
                    .prompt_feedback
                    .and_then(|f| f.block_reason)
                    .map(|r| format!(" (blocked: {r})"))
                    .unwrap_or_default();
                return Err(self.error(format!("No response from Gemini{reason}"), None));
            }
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".into());
            return Err(self.error(
                format!("Gemini returned no text (finish reason: {reason})"),
                None,
            ));
        }

        Ok(text)
    }
}

/// HTTP client with a connect timeout and no overall request timeout.
fn build_http_client() -> Client {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(
                error = %e,
                "Failed to build HTTP client, falling back to defaults without connect timeout"
            );
            Client::new()
        })
}

#[async_trait]
impl ModelClient for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn start_conversation(&self) -> Conversation {
        Conversation::new()
    }

    async fn send_turn(
        &self,
        conversation: &mut Conversation,
        parts: Vec<TurnPart>,
    ) -> Result<String, ProviderError> {
        let start = Instant::now();
        let request = Self::build_request(conversation, &parts);
        let url = format!("{}/v1beta/{}:generateContent", self.base_url, self.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.error(format!("Request failed: {e}"), None))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(self.error(
                format!("API error ({}): {}", status.as_u16(), error_text),
                Some(status.as_u16()),
            ));
        }

        let result: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| self.error(format!("Failed to parse response: {e}"), None))?;

        let text = self.extract_text(result)?;
        conversation.record(parts, &text);

        tracing::debug!(
            conversation_id = %conversation.id(),
            turns = conversation.turns(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Gemini turn completed"
        );

        Ok(text)
    }

    async fn upload_file(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
        display_name: &str,
    ) -> Result<FileRef, ProviderError> {
        let url = format!("{}/upload/v1beta/files", self.base_url);
        let size = bytes.len();

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Protocol", "raw")
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| self.error(format!("Upload failed: {e}"), None))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(self.error(
                format!("Upload error ({}): {}", status.as_u16(), error_text),
                Some(status.as_u16()),
            ));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| self.error(format!("Failed to parse upload response: {e}"), None))?;

        tracing::info!(
            file = %uploaded.file.name,
            display_name = %display_name,
            mime_type = %mime_type,
            size,
            "Uploaded file to Gemini"
        );

        Ok(FileRef {
            name: uploaded.file.name,
            uri: uploaded.file.uri,
            mime_type: uploaded
                .file
                .mime_type
                .unwrap_or_else(|| mime_type.to_string()),
        })
    }
}
