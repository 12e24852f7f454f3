//! Core error types for vigil-core.
//!
//! This module defines the error hierarchy using thiserror. Collaborator
//! failures (channels, transports) are recorded as outcomes rather than
//! raised as errors, so the hierarchy stays small.

use thiserror::Error;
use uuid::Uuid;

/// Core error type for vigil-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A confirmation response referenced a request the engine does not hold
    #[error("Unknown confirmation request: {0}")]
    UnknownConfirmation(Uuid),

    /// A confirmation response came from a contact not named on the request
    #[error("Contact '{contact_id}' is not named on confirmation request {request_id}")]
    UnknownContact { request_id: Uuid, contact_id: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
