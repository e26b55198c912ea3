//! Configuration validation.
//!
//! Startup refuses to run with a config that fails these checks, including a
//! missing model credential.

use thiserror::Error;

use crate::config::{
    Config, ModelConfig, NetworkConfig, ObservabilityConfig, SessionConfig, UploadConfig,
    MAX_SESSION_TIMEOUT_HOURS,
};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Validate for Config {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors: Vec<ValidationError> = [
            self.network.validate(),
            self.model.validate(),
            self.uploads.validate(),
            self.sessions.validate(),
            self.observability.validate(),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }
}

impl Validate for NetworkConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort {
                port: self.port,
                field: "network.port".into(),
            });
        }

        if self.bind.parse::<std::net::IpAddr>().is_err() {
            return Err(ValidationError::InvalidValue {
                field: "network.bind".into(),
                reason: format!("'{}' is not an IP address", self.bind),
            });
        }

        Ok(())
    }
}

impl Validate for ModelConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.api_key().is_none() {
            return Err(ValidationError::MissingField {
                field: "model.api_key (GOOGLE_API_KEY)".into(),
            });
        }

        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "model.name".into(),
            });
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ValidationError::InvalidValue {
                field: "model.base_url".into(),
                reason: "must start with http:// or https://".into(),
            });
        }

        Ok(())
    }
}

impl Validate for UploadConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.max_content_length == 0 {
            return Err(ValidationError::InvalidValue {
                field: "uploads.max_content_length".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for SessionConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.timeout_hours == 0 {
            return Err(ValidationError::InvalidValue {
                field: "sessions.timeout_hours".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.timeout_hours > MAX_SESSION_TIMEOUT_HOURS {
            return Err(ValidationError::InvalidValue {
                field: "sessions.timeout_hours".into(),
                reason: format!("must be at most {MAX_SESSION_TIMEOUT_HOURS}"),
            });
        }
        if self.cleanup_interval_minutes == Some(0) {
            return Err(ValidationError::InvalidValue {
                field: "sessions.cleanup_interval_minutes".into(),
                reason: "must be greater than 0 when set".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            });
        }

        Ok(())
    }
}
