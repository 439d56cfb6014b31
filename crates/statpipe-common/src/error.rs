//! Error types shared across statpipe crates

use thiserror::Error;

/// Result type alias for statpipe operations
pub type Result<T> = std::result::Result<T, StatpipeError>;

/// Errors raised while loading configuration artifacts
#[derive(Error, Debug)]
pub enum StatpipeError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid registry entry '{key}': {reason}")]
    InvalidRegistry { key: String, reason: String },
}

impl StatpipeError {
    /// Shorthand for a registry validation failure
    pub fn invalid_registry(key: impl Into<String>, reason: impl Into<String>) -> Self {
        StatpipeError::InvalidRegistry {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
