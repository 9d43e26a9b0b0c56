// src/error.rs

//! Unified error handling for the tunnel monitor.

use std::fmt;

use thiserror::Error;

/// Result type alias for monitor operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
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

    /// Every transport route for an endpoint was exhausted
    #[error("Fetch failed for {endpoint}: {message}")]
    Fetch { endpoint: String, message: String },

    /// Persisted state could not be written
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a fetch error carrying the last encountered cause.
    pub fn fetch(endpoint: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self::Fetch {
            endpoint: endpoint.into(),
            message: cause.to_string(),
        }
    }

    /// Create a persistence error.
    pub fn persistence(message: impl fmt::Display) -> Self {
        Self::Persistence(message.to_string())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
