use crate::error::{Result, WebhookError};
use crate::payload::WebhookPayload;
use crate::transport;
use flowstat_core::{Context, EventType, StatusEvent, WebhookConfig};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use tracing::{debug, instrument, warn};

/// Delivers status events to one HTTP subscriber
pub struct WebhookClient {
    config: WebhookConfig,
    method: Method,
    headers: HeaderMap,
    http: reqwest::Client,
}

impl WebhookClient {
    /// Validate the subscription and attach it to the shared transport
    pub fn new(config: WebhookConfig) -> Result<Self> {
        let method_name = match config.method.trim() {
            "" => "POST".to_string(),
            name => name.to_uppercase(),
        };
        let method = Method::from_bytes(method_name.as_bytes())
            .map_err(|_| WebhookError::InvalidMethod(config.method.clone()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| WebhookError::InvalidHeader(name.clone()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| WebhookError::InvalidHeader(name.to_string()))?;
            headers.insert(name, value);
        }

        Ok(Self {
            config,
            method,
            headers,
            http: transport::shared_client()?,
        })
    }

    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    pub fn accepts(&self, event_type: EventType) -> bool {
        self.config.accepts(event_type)
    }

    /// Deliver one event.
    ///
    /// Events outside the subscription filter return `Ok` without a request.
    /// A failed attempt (transport error or non-2xx) is retried up to
    /// `retry_count` times with a fixed `retry_delay`. Cancelling `ctx` aborts
    /// the attempt in flight and any remaining retries.
    #[instrument(
        skip_all,
        fields(
            url = %self.config.url,
            execution_id = %event.execution_id,
            event_type = %event.event_type
        )
    )]
    pub async fn send_status(&self, ctx: &Context, event: &StatusEvent) -> Result<()> {
        if !self.accepts(event.event_type) {
            return Ok(());
        }

        let body = self.build_body(event)?;
        let retries = self.config.retry_count;
        let mut attempt: u32 = 0;

        loop {
            let err = match ctx.run(self.deliver(&body)).await {
                Err(_) => return Err(WebhookError::Cancelled),
                Ok(Ok(())) => {
                    debug!(attempt, "Webhook delivered");
                    return Ok(());
                }
                Ok(Err(e)) => e,
            };

            if attempt >= retries {
                warn!(attempts = attempt + 1, error = %err, "Webhook delivery failed");
                return Err(WebhookError::RetriesExhausted {
                    retries,
                    last: Box::new(err),
                });
            }

            attempt += 1;
            debug!(attempt, error = %err, "Webhook attempt failed, retrying");
            if ctx.run(tokio::time::sleep(self.config.retry_delay())).await.is_err() {
                return Err(WebhookError::Cancelled);
            }
        }
    }

    fn build_body(&self, event: &StatusEvent) -> Result<Vec<u8>> {
        let mut payload = WebhookPayload::new(event.clone());
        if let Some(secret) = self.config.secret.as_deref().filter(|s| !s.is_empty()) {
            payload.sign(secret)?;
        }
        Ok(serde_json::to_vec(&payload)?)
    }

    async fn deliver(&self, body: &[u8]) -> Result<()> {
        let response = self
            .http
            .request(self.method.clone(), &self.config.url)
            .headers(self.headers.clone())
            .timeout(self.config.timeout())
            .body(body.to_vec())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(WebhookError::Status(status.as_u16()))
        }
    }
}

impl std::fmt::Debug for WebhookClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookClient")
            .field("url", &self.config.url)
            .field("method", &self.method)
            .field("events", &self.config.events)
            .finish()
    }
}
