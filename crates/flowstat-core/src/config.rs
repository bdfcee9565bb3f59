//! Settings loader
//!
//! Settings are layered from an optional TOML file and `FLOWSTAT__`-prefixed
//! environment variables (`FLOWSTAT__STATUS__STORE__BACKEND=sqlite`). Build a
//! [`Settings`] once at startup and hand references to the components that
//! need it.
//!
//! ```toml
//! [server]
//! api_port = ":20201"
//!
//! [status.webhook]
//! url = "http://localhost:20201/api/v1/webhook/status"
//! secret = "s3cr3t"
//! events = ["node_end", "complete"]
//!
//! [status.store]
//! backend = "sqlite"
//!
//! [status.store.sqlite]
//! url = "sqlite:///var/lib/flowstat/status.db"
//! ```

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::event::EventType;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "FLOWSTAT";

pub const DEFAULT_API_PORT: &str = ":20201";
pub const DEFAULT_METHOD: &str = "POST";
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_RETRY_COUNT: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
pub const DEFAULT_MAX_RECORDS: usize = 1000;
pub const DEFAULT_EXEC_TABLE: &str = "flow_executions";
pub const DEFAULT_STATUS_TABLE: &str = "flow_execution_statuses";

/// Path of the local status receiver, relative to the API root
pub const WEBHOOK_STATUS_PATH: &str = "/api/v1/webhook/status";

fn default_true() -> bool {
    true
}

fn default_api_port() -> String {
    DEFAULT_API_PORT.to_string()
}

fn default_method() -> String {
    DEFAULT_METHOD.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_retry_count() -> u32 {
    DEFAULT_RETRY_COUNT
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_max_records() -> usize {
    DEFAULT_MAX_RECORDS
}

fn default_exec_table() -> String {
    DEFAULT_EXEC_TABLE.to_string()
}

fn default_status_table() -> String {
    DEFAULT_STATUS_TABLE.to_string()
}

fn default_max_connections() -> u32 {
    5
}

/// Root settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub status: StatusSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    /// Listen port of the local API, e.g. `":20201"` or `"8080"`
    #[serde(default = "default_api_port")]
    pub api_port: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
        }
    }
}

/// Status tracking settings: webhook delivery, store and collector
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StatusSettings {
    #[serde(default)]
    pub webhook: WebhookSettings,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub collector: CollectorSettings,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CollectorSettings {
    /// Attach input/output counts and samples to node events
    #[serde(default)]
    pub capture_data_flow: bool,
}

/// Application-level webhook settings, resolved into a [`WebhookConfig`]
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Event types to deliver; empty delivers everything
    #[serde(default)]
    pub events: Vec<EventType>,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            url: None,
            method: default_method(),
            headers: HashMap::new(),
            secret: None,
            timeout_secs: default_timeout_secs(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            events: Vec::new(),
        }
    }
}

impl WebhookSettings {
    /// Resolve into a delivery config.
    ///
    /// Returns `None` when webhooks are disabled or when neither an explicit
    /// URL nor `default_url` yields a target.
    pub fn resolve(&self, default_url: impl FnOnce() -> Option<String>) -> Option<WebhookConfig> {
        if !self.enabled {
            debug!("Webhook delivery disabled");
            return None;
        }

        let url = match self.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => default_url()?,
        };

        let method = if self.method.trim().is_empty() {
            default_method()
        } else {
            self.method.trim().to_uppercase()
        };

        Some(WebhookConfig {
            url,
            method,
            headers: self.headers.clone(),
            secret: self.secret.clone().filter(|s| !s.is_empty()),
            timeout_secs: if self.timeout_secs == 0 {
                DEFAULT_TIMEOUT_SECS
            } else {
                self.timeout_secs
            },
            retry_count: self.retry_count,
            retry_delay_ms: self.retry_delay_ms,
            events: self.events.clone(),
        })
    }
}

/// Delivery target of one webhook subscription
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// HMAC-SHA256 key; payloads are signed when set
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Additional attempts after the first failure
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Fixed pause between attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Event-type allow-list; empty delivers everything
    #[serde(default)]
    pub events: Vec<EventType>,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            headers: HashMap::new(),
            secret: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            events: Vec::new(),
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_retry(mut self, retry_count: u32, retry_delay_ms: u64) -> Self {
        self.retry_count = retry_count;
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_events(mut self, events: impl IntoIterator<Item = EventType>) -> Self {
        self.events = events.into_iter().collect();
        self
    }

    /// Per-request timeout; zero means the default
    pub fn timeout(&self) -> Duration {
        match self.timeout_secs {
            0 => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Whether the subscription wants events of this type
    pub fn accepts(&self, event_type: EventType) -> bool {
        self.events.is_empty() || self.events.contains(&event_type)
    }
}

/// Which store backend to build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process, lost on restart
    #[default]
    Memory,
    /// SQLite database via sqlx
    Sqlite,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub backend: StoreBackend,
    /// Advisory size of the in-memory store
    #[serde(default = "default_max_records")]
    pub max_records: usize,
    #[serde(default)]
    pub sqlite: SqliteSettings,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: StoreBackend::Memory,
            max_records: default_max_records(),
            sqlite: SqliteSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SqliteSettings {
    /// `sqlite:///path/to/status.db` or `sqlite::memory:`
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_exec_table")]
    pub exec_table: String,
    #[serde(default = "default_status_table")]
    pub status_table: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for SqliteSettings {
    fn default() -> Self {
        Self {
            url: None,
            exec_table: default_exec_table(),
            status_table: default_status_table(),
            max_connections: default_max_connections(),
        }
    }
}

impl SqliteSettings {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Check the connection URL and that table names are plain identifiers
    pub fn validate(&self) -> Result<()> {
        match self.url.as_deref() {
            Some(url) if !url.trim().is_empty() => {}
            _ => return Err(ConfigError::missing("status.store.sqlite.url")),
        }
        for (key, table) in [
            ("status.store.sqlite.exec_table", &self.exec_table),
            ("status.store.sqlite.status_table", &self.status_table),
        ] {
            if !is_identifier(table) {
                return Err(ConfigError::invalid(
                    key,
                    format!("'{}' is not a valid table name", table),
                ));
            }
        }
        if self.exec_table == self.status_table {
            return Err(ConfigError::invalid(
                "status.store.sqlite.status_table",
                "must differ from exec_table",
            ));
        }
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Settings {
    /// Load settings from an optional TOML file overlaid with environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            debug!("Loading settings from {}", path.display());
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        let config = builder.add_source(env_source()).build()?;
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from TOML text, ignoring the environment
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let store = &self.status.store;
        if store.enabled && store.backend == StoreBackend::Sqlite {
            store.sqlite.validate()?;
        }
        Ok(())
    }

    /// URL of the local status receiver derived from `server.api_port`
    pub fn default_webhook_url(&self) -> String {
        build_default_webhook_url("http", None, &self.server.api_port)
    }

    /// Resolve the webhook settings, falling back to the local receiver
    pub fn webhook_config(&self) -> Option<WebhookConfig> {
        self.status
            .webhook
            .resolve(|| Some(self.default_webhook_url()))
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("status.webhook.events")
}

/// Build the URL of the local status receiver.
///
/// With no host, `localhost` is combined with `api_port` (`":8080"` and
/// `"8080"` both work).
pub fn build_default_webhook_url(scheme: &str, host: Option<&str>, api_port: &str) -> String {
    let host = match host.filter(|h| !h.is_empty()) {
        Some(host) => host.to_string(),
        None => {
            let port = api_port.trim();
            if port.is_empty() {
                "localhost".to_string()
            } else if port.starts_with(':') {
                format!("localhost{}", port)
            } else {
                format!("localhost:{}", port)
            }
        }
    };
    format!("{}://{}{}", scheme, host, WEBHOOK_STATUS_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.api_port, ":20201");
        assert!(settings.status.webhook.enabled);
        assert_eq!(settings.status.webhook.retry_count, 3);
        assert_eq!(settings.status.webhook.retry_delay_ms, 1000);
        assert_eq!(settings.status.store.backend, StoreBackend::Memory);
        assert_eq!(settings.status.store.sqlite.exec_table, DEFAULT_EXEC_TABLE);
        assert!(!settings.status.collector.capture_data_flow);
    }

    #[test]
    fn test_zero_timeout_falls_back_to_default() {
        let config: WebhookConfig = serde_json::from_value(serde_json::json!({
            "url": "http://localhost/hook",
            "timeout_secs": 0,
            "retry_count": 0
        }))
        .unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(
            WebhookConfig::new("http://localhost/hook")
                .with_timeout_secs(2)
                .timeout(),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_from_toml() {
        let settings = Settings::from_toml_str(
            r#"
            [server]
            api_port = "8080"

            [status.webhook]
            url = "http://hooks.local/status"
            method = "put"
            secret = "k"
            retry_count = 1
            events = ["complete"]

            [status.webhook.headers]
            x-tenant = "acme"

            [status.store]
            backend = "sqlite"

            [status.store.sqlite]
            url = "sqlite::memory:"
            exec_table = "runs"
            "#,
        )
        .unwrap();

        assert_eq!(settings.server.api_port, "8080");
        assert_eq!(settings.status.store.backend, StoreBackend::Sqlite);
        assert_eq!(settings.status.store.sqlite.exec_table, "runs");
        assert_eq!(settings.status.store.sqlite.status_table, DEFAULT_STATUS_TABLE);

        let webhook = settings.webhook_config().unwrap();
        assert_eq!(webhook.url, "http://hooks.local/status");
        assert_eq!(webhook.method, "PUT");
        assert_eq!(webhook.secret.as_deref(), Some("k"));
        assert_eq!(webhook.retry_count, 1);
        assert_eq!(webhook.retry_delay_ms, DEFAULT_RETRY_DELAY_MS);
        assert_eq!(webhook.events, vec![EventType::Complete]);
        assert_eq!(webhook.headers.get("x-tenant").map(String::as_str), Some("acme"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flowstat.toml");
        std::fs::write(&path, "[status.webhook]\nenabled = false\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert!(!settings.status.webhook.enabled);
        assert!(settings.webhook_config().is_none());
    }

    #[test]
    fn test_sqlite_backend_requires_url() {
        let err = Settings::from_toml_str("[status.store]\nbackend = \"sqlite\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn test_rejects_bad_table_name() {
        let mut sqlite = SqliteSettings::with_url("sqlite::memory:");
        sqlite.status_table = "statuses; DROP TABLE x".to_string();
        assert!(matches!(sqlite.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_resolve_falls_back_to_default_url() {
        let settings = Settings::default();
        let webhook = settings.webhook_config().unwrap();
        assert_eq!(webhook.url, "http://localhost:20201/api/v1/webhook/status");
        assert_eq!(webhook.method, "POST");
        assert_eq!(webhook.timeout_secs, 5);
        assert!(webhook.secret.is_none());
    }

    #[test]
    fn test_resolve_without_any_url() {
        let webhook = WebhookSettings::default();
        assert!(webhook.resolve(|| None).is_none());
    }

    #[test]
    fn test_build_default_webhook_url() {
        assert_eq!(
            build_default_webhook_url("http", None, ":9000"),
            "http://localhost:9000/api/v1/webhook/status"
        );
        assert_eq!(
            build_default_webhook_url("http", None, "9000"),
            "http://localhost:9000/api/v1/webhook/status"
        );
        assert_eq!(
            build_default_webhook_url("https", Some("api.example.com"), ":9000"),
            "https://api.example.com/api/v1/webhook/status"
        );
        assert_eq!(
            build_default_webhook_url("http", None, ""),
            "http://localhost/api/v1/webhook/status"
        );
    }

    #[test]
    fn test_accepts_filter() {
        let all = WebhookConfig::new("http://x");
        assert!(all.accepts(EventType::NodeStart));

        let complete_only = WebhookConfig::new("http://x").with_events([EventType::Complete]);
        assert!(complete_only.accepts(EventType::Complete));
        assert!(!complete_only.accepts(EventType::NodeEnd));
    }
}
