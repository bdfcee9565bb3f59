//! Prometheus metrics for status store operations
//!
//! Provides observability into store operations including:
//! - Executions created and finished
//! - Events appended by type
//! - Operation latencies and error rates

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, HistogramOpts, HistogramVec, Opts, Registry};
use std::sync::Once;
use tracing::info;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Total executions created
    pub static ref EXECUTIONS_CREATED_TOTAL: Counter = Counter::new(
        "flowstat_store_executions_created_total",
        "Total number of executions created"
    ).unwrap();

    /// Executions reaching a terminal status
    pub static ref EXECUTIONS_FINISHED_TOTAL: CounterVec = CounterVec::new(
        Opts::new("flowstat_store_executions_finished_total", "Executions reaching a terminal status"),
        &["status"]
    ).unwrap();

    /// Events appended to execution histories
    pub static ref EVENTS_APPENDED_TOTAL: CounterVec = CounterVec::new(
        Opts::new("flowstat_store_events_appended_total", "Status events appended"),
        &["event_type"]
    ).unwrap();

    /// Events rejected because the execution was unknown
    pub static ref EVENTS_REJECTED_TOTAL: Counter = Counter::new(
        "flowstat_store_events_rejected_total",
        "Status events for unknown executions"
    ).unwrap();

    /// Store operation latency
    pub static ref STORE_OP_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("flowstat_store_operation_seconds", "Store operation duration")
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        &["operation", "store_type"]
    ).unwrap();

    /// Store operation errors
    pub static ref STORE_OP_ERRORS: CounterVec = CounterVec::new(
        Opts::new("flowstat_store_errors_total", "Store operation errors"),
        &["operation", "store_type"]
    ).unwrap();
}

static INIT: Once = Once::new();

/// Register all metrics with the global registry
pub fn register_metrics() {
    INIT.call_once(|| {
        info!("Registering status store metrics");

        REGISTRY.register(Box::new(EXECUTIONS_CREATED_TOTAL.clone())).ok();
        REGISTRY.register(Box::new(EXECUTIONS_FINISHED_TOTAL.clone())).ok();
        REGISTRY.register(Box::new(EVENTS_APPENDED_TOTAL.clone())).ok();
        REGISTRY.register(Box::new(EVENTS_REJECTED_TOTAL.clone())).ok();
        REGISTRY.register(Box::new(STORE_OP_DURATION.clone())).ok();
        REGISTRY.register(Box::new(STORE_OP_ERRORS.clone())).ok();
    });
}

/// Helper to time a store operation
pub struct OperationTimer {
    operation: &'static str,
    store_type: &'static str,
    start: std::time::Instant,
}

impl OperationTimer {
    pub fn new(operation: &'static str, store_type: &'static str) -> Self {
        Self {
            operation,
            store_type,
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        STORE_OP_DURATION
            .with_label_values(&[self.operation, self.store_type])
            .observe(duration);
    }
}

pub fn record_execution_created() {
    EXECUTIONS_CREATED_TOTAL.inc();
}

pub fn record_execution_finished(status: &str) {
    EXECUTIONS_FINISHED_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_event_appended(event_type: &str) {
    EVENTS_APPENDED_TOTAL.with_label_values(&[event_type]).inc();
}

pub fn record_event_rejected() {
    EVENTS_REJECTED_TOTAL.inc();
}

pub fn record_store_error(operation: &str, store_type: &str) {
    STORE_OP_ERRORS
        .with_label_values(&[operation, store_type])
        .inc();
}

/// Get metrics as text for Prometheus scraping
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
