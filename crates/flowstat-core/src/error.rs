//! Error types for flowstat configuration

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config source error: {0}")]
    Source(#[from] config::ConfigError),

    #[error("Missing setting: {0}")]
    Missing(String),

    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// Result type alias using [`ConfigError`]
pub type Result<T> = std::result::Result<T, ConfigError>;

impl ConfigError {
    /// Create a missing setting error
    pub fn missing(key: impl Into<String>) -> Self {
        ConfigError::Missing(key.into())
    }

    /// Create an invalid setting error
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
