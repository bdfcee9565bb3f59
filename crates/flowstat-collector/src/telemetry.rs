use flowstat_core::{ExecutionStatus, StatusEvent};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Tracing output for one collector
pub struct CollectorTelemetry {
    execution_id: String,
    app_name: String,
}

impl CollectorTelemetry {
    pub fn new(execution_id: &str, app_name: &str) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            app_name: app_name.to_string(),
        }
    }

    #[instrument(skip(self), fields(execution_id = %self.execution_id, app = %self.app_name))]
    pub fn execution_started(&self, request_id: &str) {
        info!("Started collecting execution status");
    }

    pub fn node_finished(&self, node_key: &str, duration: Option<Duration>, error: Option<&str>) {
        let duration_ms = duration.map(|d| d.as_millis() as u64);
        match error {
            Some(error) => warn!(
                execution_id = %self.execution_id,
                node_key,
                duration_ms,
                error,
                "Node failed"
            ),
            None => debug!(
                execution_id = %self.execution_id,
                node_key,
                duration_ms,
                "Node finished"
            ),
        }
    }

    pub fn execution_finished(&self, status: ExecutionStatus, elapsed: Duration) {
        info!(
            execution_id = %self.execution_id,
            app = %self.app_name,
            status = %status,
            duration_ms = elapsed.as_millis() as u64,
            "Execution finished"
        );
    }

    pub fn store_write_failed(&self, event: &StatusEvent, reason: &str) {
        warn!(
            execution_id = %self.execution_id,
            event_type = %event.event_type,
            reason,
            "Status store did not record event"
        );
    }
}
