// src/error.rs

//! Unified error handling for the backup application.

use std::fmt;

use thiserror::Error;

/// Result type alias for backup operations.
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

    /// Relational backend failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Background task panicked or was aborted
    #[error("Task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Remote call failed or the remote API answered with an error
    #[error("Remote error for {context}: {message}")]
    Remote { context: String, message: String },

    /// Remote payload could not be interpreted
    #[error("Decode error: {0}")]
    Decode(String),

    /// Storage backend rejected an operation
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Discovery gave up after repeated failures
    #[error("Discovery error: {0}")]
    Discovery(String),
}

impl AppError {
    /// Create a remote error with context.
    pub fn remote(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Remote {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a decode error.
    pub fn decode(message: impl fmt::Display) -> Self {
        Self::Decode(message.to_string())
    }

    /// Create a storage error.
    pub fn storage(message: impl fmt::Display) -> Self {
        Self::Storage(message.to_string())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a discovery error.
    pub fn discovery(message: impl Into<String>) -> Self {
        Self::Discovery(message.into())
    }

    /// Errors that must stop the process instead of being logged per item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Validation(_) | Self::Discovery(_) | Self::Task(_)
        )
    }
}
