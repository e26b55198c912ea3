//! Gemchat Gateway - HTTP front for Gemini multimodal chat.
//!
//! This crate provides:
//! - Per-session conversations with a remote Gemini model
//! - Image and document upload normalization
//! - Session listing, inspection and expiry
//! - Static hosting of the web frontend
//!
//! ## Architecture
//!
//! ```text
//! Client → Router (media → session store) → Gemini
//!                         ↓
//!                   turn counting
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod media;
pub mod provider;
pub mod routes;
pub mod session;

pub use provider::{Conversation, FileRef, GeminiClient, ModelClient, ProviderError, TurnPart};
pub use routes::AppState;
pub use session::{SessionStore, SessionSummary};

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::Router;
use gemchat_common::config::{Config, CorsConfig};
use gemchat_common::util::format_megabytes;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

/// Build the gateway router with all routes and middleware.
pub fn build_router(config: &Config, client: Arc<dyn ModelClient>) -> Router {
    build_router_with_state(config, AppState::new(config, client))
}

/// Build the router around existing state, e.g. one shared with a cleanup task.
pub fn build_router_with_state(config: &Config, state: AppState) -> Router {
    let frontend = &config.frontend.dir;
    let static_files =
        ServeDir::new(frontend).fallback(ServeFile::new(frontend.join("index.html")));

    routes::build_routes(state)
        .fallback_service(static_files)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.uploads.max_content_length))
        .layer(cors_layer(&config.cors))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if cors.allows_any() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = cors
        .origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}

/// Start the gateway server.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = config.listen_address()?;

    let client: Arc<dyn ModelClient> = Arc::new(GeminiClient::from_config(&config.model)?);
    let state = AppState::new(config, client);

    if let Some(interval) = config.sessions.cleanup_interval() {
        tracing::info!(
            interval_secs = interval.as_secs(),
            "Periodic session cleanup enabled"
        );
        session::spawn_cleanup_task(
            Arc::clone(&state.sessions),
            state.session_timeout,
            interval,
        );
    }

    let router = build_router_with_state(config, state);

    tracing::info!(
        model = %config.model.name,
        max_upload = %format_megabytes(config.uploads.max_content_length),
        frontend = %config.frontend.dir.display(),
        "Starting Gemchat Gateway on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
