//! Error types for the infusion_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for infusion_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session refers to something the registry cannot provide
    #[error("State error: {0}")]
    State(String),

    /// Remote drug configuration could not be retrieved
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Remote document is not shaped like a drug configuration
    #[error("Schema error: {0}")]
    Schema(String),

    /// Document is well-formed but its drug records are not usable
    #[error("Validation failed with {} problem(s): {}", .0.len(), .0.join("; "))]
    Validation(Vec<String>),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
