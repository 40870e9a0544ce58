//! Error types for jsprobe
//!
//! Only conditions that stop an origin or a run live here. Malformed JavaScript
//! is the normal case for the engine and is reported through typed outcomes
//! (`NotFound`, `RepairFailed`, absent parameters) instead.

use thiserror::Error;

/// Main error type for jsprobe operations
#[derive(Debug, Error)]
pub enum JsProbeError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Template error: {0}")]
    TemplateError(#[from] tera::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid pattern: {0}")]
    PatternError(#[from] regex::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to fetch '{0}': {1}")]
    FetchFailed(String, String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,
}

/// Result type alias for jsprobe operations
pub type Result<T> = std::result::Result<T, JsProbeError>;
