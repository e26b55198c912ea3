//! gemchat common - configuration, errors, and logging shared by the gateway.
//!
//! This crate provides:
//! - Configuration types and loading (file + environment)
//! - Configuration validation
//! - The unified error type and its HTTP mapping
//! - Logging setup and the request span macro
//! - Small string helpers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    Config, CorsConfig, FrontendConfig, ModelConfig, NetworkConfig, ObservabilityConfig,
    SessionConfig, UploadConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};
