//! Error types for gemchat.

use thiserror::Error;

/// Result type alias using the gemchat error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the gateway.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing or invalid request input
    #[error("{0}")]
    InvalidInput(String),

    /// Upload whose extension is not on the allow-list
    #[error("File type not supported")]
    UnsupportedFileType(String),

    /// Bytes that could not be decoded or opened as media
    #[error("{0}")]
    InvalidMedia(String),

    /// The remote file upload failed
    #[error("Error uploading file: {0}")]
    UploadFailed(String),

    /// Any failure reported by the remote model service
    #[error("{0}")]
    RemoteCallFailed(String),

    /// Request body over the configured size limit
    #[error("{0}")]
    PayloadTooLarge(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) | Self::UnsupportedFileType(_) | Self::InvalidMedia(_) => 400,
            Self::PayloadTooLarge(_) => 413,
            Self::WithContext { source, .. } => source.status_code(),
            _ => 500,
        }
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = axum::http::StatusCode::from_u16(self.status_code())
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, "Request rejected");
        }

        (
            status,
            axum::Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}
