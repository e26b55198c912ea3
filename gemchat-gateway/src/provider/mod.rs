//! Remote model client abstraction.
//!
//! The gateway only needs three things from a model service: start a
//! conversation, send a turn and read the reply, and upload a file for later
//! reference. [`GeminiClient`] speaks the Google Gemini REST API.

mod gemini;

pub use gemini::GeminiClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// Client Trait
// ============================================================================

/// Boundary to an external conversational model.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Model identifier reported by `/health`.
    fn model_name(&self) -> &str;

    /// Start a new, empty conversation.
    fn start_conversation(&self) -> Conversation;

    /// Send one user turn and return the reply text.
    ///
    /// On success the turn and reply are appended to `conversation`; on
    /// failure the conversation is left untouched.
    async fn send_turn(
        &self,
        conversation: &mut Conversation,
        parts: Vec<TurnPart>,
    ) -> Result<String, ProviderError>;

    /// Upload raw bytes and return a reference usable as a turn part.
    async fn upload_file(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
        display_name: &str,
    ) -> Result<FileRef, ProviderError>;
}

/// Error from the remote model service.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub provider: String,
    pub model: String,
    pub message: String,
    pub status_code: Option<u16>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}] {}", self.provider, self.model, self.message)
    }
}

impl std::error::Error for ProviderError {}

// ============================================================================
// Conversation Types
// ============================================================================

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One piece of turn content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnPart {
    Text(String),
    /// Inline image bytes in a format the model accepts.
    Image { mime_type: String, data: Vec<u8> },
    /// A previously uploaded file.
    File(FileRef),
}

impl TurnPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Image { .. } => "image",
            Self::File(_) => "file",
        }
    }
}

/// Reference to a file held by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// Resource name, e.g. `files/abc-123`.
    pub name: String,
    pub uri: String,
    pub mime_type: String,
}

/// A completed exchange entry in a conversation.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub role: Role,
    pub parts: Vec<TurnPart>,
}

/// Handle to an ongoing multi-turn conversation.
///
/// Owned by exactly one session. The history is replayed to the model on
/// every turn, so dropping the handle ends the conversation.
#[derive(Debug)]
pub struct Conversation {
    id: String,
    history: Vec<Exchange>,
}

impl Conversation {
    /// Create an empty conversation with a fresh identifier.
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            history: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn history(&self) -> &[Exchange] {
        &self.history
    }

    /// Number of completed user turns.
    pub fn turns(&self) -> usize {
        self.history.iter().filter(|e| e.role == Role::User).count()
    }

    /// Record a completed turn and its reply.
    pub fn record(&mut self, user_parts: Vec<TurnPart>, reply: &str) {
        self.history.push(Exchange {
            role: Role::User,
            parts: user_parts,
        });
        self.history.push(Exchange {
            role: Role::Model,
            parts: vec![TurnPart::text(reply)],
        });
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
