use crate::collector::StatusCollector;
use crate::metrics::CollectorMetrics;
use anyhow::{Context as _, Result};
use flowstat_core::Settings;
use flowstat_store::{open_store, StatusStore, StoreError};
use flowstat_webhook::WebhookClient;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Builds wired collectors from one set of settings.
///
/// Holds the shared store, the webhook subscriptions and the metrics
/// registry; each execution gets its own [`StatusCollector`].
pub struct CollectorFactory {
    store: Option<Arc<dyn StatusStore>>,
    webhooks: Vec<Arc<WebhookClient>>,
    capture_data_flow: bool,
    metrics: CollectorMetrics,
}

impl CollectorFactory {
    pub fn new(store: Option<Arc<dyn StatusStore>>) -> Result<Self> {
        Ok(Self {
            store,
            webhooks: Vec::new(),
            capture_data_flow: false,
            metrics: CollectorMetrics::new().context("Failed to create collector metrics")?,
        })
    }

    /// Build the store and webhook subscription from `settings`.
    ///
    /// A disabled store leaves collectors without persistence; any other
    /// store construction failure is fatal.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate().context("Invalid status settings")?;

        let store = match open_store(&settings.status.store).await {
            Ok(store) => Some(store),
            Err(StoreError::Disabled) => {
                info!("Status store disabled, executions will not be persisted");
                None
            }
            Err(e) => return Err(e).context("Failed to build status store"),
        };

        let mut factory = Self::new(store)?
            .with_data_flow_capture(settings.status.collector.capture_data_flow);

        match settings.webhook_config() {
            Some(config) => {
                info!(url = %config.url, method = %config.method, "Status webhook enabled");
                let client = WebhookClient::new(config).context("Invalid webhook configuration")?;
                factory = factory.with_webhook_client(client);
            }
            None => info!("Status webhook disabled"),
        }

        Ok(factory)
    }

    pub fn with_webhook_client(mut self, client: impl Into<Arc<WebhookClient>>) -> Self {
        self.webhooks.push(client.into());
        self
    }

    pub fn with_data_flow_capture(mut self, enabled: bool) -> Self {
        self.capture_data_flow = enabled;
        self
    }

    pub fn store(&self) -> Option<&Arc<dyn StatusStore>> {
        self.store.as_ref()
    }

    pub fn webhook_clients(&self) -> &[Arc<WebhookClient>] {
        &self.webhooks
    }

    pub fn metrics(&self) -> &CollectorMetrics {
        &self.metrics
    }

    /// Create the execution record and a collector wired to this factory.
    ///
    /// A fresh UUID is used when `execution_id` is `None`.
    pub async fn start_execution(
        &self,
        execution_id: Option<String>,
        app_name: &str,
        request_id: &str,
    ) -> Result<Arc<StatusCollector>> {
        let execution_id = execution_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        if let Some(store) = &self.store {
            store
                .create_execution(&execution_id, app_name, request_id)
                .await
                .with_context(|| format!("Failed to create execution {}", execution_id))?;
        }

        let collector = StatusCollector::new(execution_id, app_name, request_id)
            .with_data_flow_capture(self.capture_data_flow)
            .with_metrics(self.metrics.clone());
        if let Some(store) = &self.store {
            collector.set_status_store(Arc::clone(store));
        }
        for client in &self.webhooks {
            collector.add_webhook_client(Arc::clone(client));
        }
        Ok(Arc::new(collector))
    }
}
