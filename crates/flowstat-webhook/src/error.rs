use thiserror::Error;

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP status error: {0}")]
    Status(u16),

    #[error("Invalid webhook method: {0}")]
    InvalidMethod(String),

    #[error("Invalid webhook header: {0}")]
    InvalidHeader(String),

    #[error("Webhook delivery cancelled")]
    Cancelled,

    #[error("Send webhook failed after {retries} retries: {last}")]
    RetriesExhausted {
        retries: u32,
        #[source]
        last: Box<WebhookError>,
    },
}

pub type Result<T> = std::result::Result<T, WebhookError>;
