//! Error types shared across the crate.

use std::fmt;

use thiserror::Error;

/// Result alias used by library operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector or pattern did not compile
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Page could not be fetched
    #[error("Fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    /// A storage blob could not be read or written
    #[error("Persistence error for '{key}': {message}")]
    Persistence { key: String, message: String },

    /// Export sink rejected the payload
    #[error("Export failed: {0}")]
    Export(String),

    /// Headless browser failure
    #[error("Browser error: {0}")]
    Browser(String),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a fetch error for the given URL.
    pub fn fetch(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a persistence error for a storage key.
    pub fn persistence(key: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Persistence {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Create an export error.
    pub fn export(message: impl fmt::Display) -> Self {
        Self::Export(message.to_string())
    }

    /// Whether the error came from reaching or reading the remote page.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Self::Fetch { .. } | Self::Http(_) | Self::Browser(_))
    }
}
