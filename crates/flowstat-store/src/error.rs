use flowstat_core::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Execution already exists: {0}")]
    AlreadyExists(String),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
    #[error("Status store is disabled")]
    Disabled,
}

pub type Result<T> = std::result::Result<T, StoreError>;
