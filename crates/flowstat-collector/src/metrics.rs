use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Collector metrics, one registry per factory
#[derive(Clone)]
pub struct CollectorMetrics {
    /// Collectors started
    executions_started: IntCounter,

    /// Collectors that have not seen a complete event yet
    active_executions: IntGauge,

    /// Executions reaching a terminal status, by status
    executions_finished: IntCounterVec,

    /// Execution duration histogram, by status
    execution_duration: HistogramVec,

    /// Events dispatched, by event type
    events_dispatched: IntCounterVec,

    /// Store writes that failed or were not accepted
    store_write_failures: IntCounter,

    /// Webhook deliveries, by outcome
    webhook_deliveries: IntCounterVec,

    registry: Registry,
}

impl CollectorMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let executions_started = IntCounter::new(
            "flowstat_executions_started_total",
            "Total number of executions started",
        )?;
        registry.register(Box::new(executions_started.clone()))?;

        let active_executions = IntGauge::new(
            "flowstat_active_executions",
            "Number of executions still running",
        )?;
        registry.register(Box::new(active_executions.clone()))?;

        let executions_finished = IntCounterVec::new(
            Opts::new(
                "flowstat_executions_finished_total",
                "Executions reaching a terminal status",
            ),
            &["status"],
        )?;
        registry.register(Box::new(executions_finished.clone()))?;

        let execution_duration = HistogramVec::new(
            HistogramOpts::new(
                "flowstat_execution_duration_seconds",
                "Execution duration in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
            &["status"],
        )?;
        registry.register(Box::new(execution_duration.clone()))?;

        let events_dispatched = IntCounterVec::new(
            Opts::new("flowstat_events_dispatched_total", "Status events dispatched"),
            &["event_type"],
        )?;
        registry.register(Box::new(events_dispatched.clone()))?;

        let store_write_failures = IntCounter::new(
            "flowstat_store_write_failures_total",
            "Status events the store did not record",
        )?;
        registry.register(Box::new(store_write_failures.clone()))?;

        let webhook_deliveries = IntCounterVec::new(
            Opts::new("flowstat_webhook_deliveries_total", "Webhook deliveries"),
            &["outcome"],
        )?;
        registry.register(Box::new(webhook_deliveries.clone()))?;

        Ok(Self {
            executions_started,
            active_executions,
            executions_finished,
            execution_duration,
            events_dispatched,
            store_write_failures,
            webhook_deliveries,
            registry,
        })
    }

    pub fn execution_started(&self) {
        self.executions_started.inc();
        self.active_executions.inc();
    }

    pub fn execution_finished(&self, status: &str, duration_secs: f64) {
        self.executions_finished.with_label_values(&[status]).inc();
        self.execution_duration
            .with_label_values(&[status])
            .observe(duration_secs);
        self.active_executions.dec();
    }

    pub fn event_dispatched(&self, event_type: &str) {
        self.events_dispatched.with_label_values(&[event_type]).inc();
    }

    pub fn store_write_failed(&self) {
        self.store_write_failures.inc();
    }

    pub fn webhook_delivered(&self, ok: bool) {
        let outcome = if ok { "ok" } else { "failed" };
        self.webhook_deliveries.with_label_values(&[outcome]).inc();
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prometheus text exposition of this registry
    pub fn gather(&self) -> String {
        let mut buffer = Vec::new();
        if TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registries_are_independent() {
        let a = CollectorMetrics::new().unwrap();
        let b = CollectorMetrics::new().unwrap();

        a.execution_started();
        a.event_dispatched("node_start");
        a.execution_finished("completed", 0.2);

        assert_eq!(a.active_executions.get(), 0);
        assert_eq!(a.executions_started.get(), 1);
        assert_eq!(b.executions_started.get(), 0);
    }

    #[test]
    fn test_gather_exposes_counters() {
        let metrics = CollectorMetrics::new().unwrap();
        metrics.webhook_delivered(true);
        metrics.webhook_delivered(false);
        metrics.store_write_failed();

        let text = metrics.gather();
        assert!(text.contains("flowstat_webhook_deliveries_total{outcome=\"ok\"} 1"));
        assert!(text.contains("flowstat_webhook_deliveries_total{outcome=\"failed\"} 1"));
        assert!(text.contains("flowstat_store_write_failures_total 1"));
    }
}
