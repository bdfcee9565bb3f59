//! Core types and utilities for flowstat
//!
//! # Modules
//!
//! - `config`: Settings loading and webhook/store configuration
//! - `context`: Ambient call-scoped context (cancellation, deadline, typed values)
//! - `error`: Configuration error types
//! - `event`: Status events as delivered on the wire
//! - `execution`: Execution records and terminal status
//! - `telemetry`: Tracing subscriber bootstrap
//! - `usage`: Token usage counters

pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod execution;
pub mod telemetry;
pub mod usage;

// Re-exports
pub use config::{
    build_default_webhook_url, CollectorSettings, ServerSettings, Settings, SqliteSettings,
    StatusSettings, StoreBackend, StoreConfig, WebhookConfig, WebhookSettings,
};
pub use context::{Cancelled, Context};
pub use error::{ConfigError, Result};
pub use event::{ControlFlowStatus, DataFlowStatus, EventStatus, EventType, StatusEvent};
pub use execution::{ExecutionRecord, ExecutionStatus, Message};
pub use usage::Usage;
