//! Per-execution status collector
//!
//! The orchestration engine drives a [`StatusCollector`] through lifecycle
//! hooks. Each hook turns into one [`StatusEvent`] which is appended to the
//! local history, handed to the optional callback, written to the store and
//! finally fanned out to every webhook on a detached task.

use crate::metrics::CollectorMetrics;
use crate::telemetry::CollectorTelemetry;
use crate::usage::UsageAccumulator;
use flowstat_core::{
    Context, ControlFlowStatus, DataFlowStatus, EventStatus, EventType, ExecutionStatus, Message,
    StatusEvent, Usage,
};
use flowstat_store::StatusStore;
use flowstat_webhook::WebhookClient;
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, warn};

/// Error reported by a node; recorded on the event, never raised
pub type NodeError = dyn Error + Send + Sync;

/// In-process observer invoked synchronously for every event
pub type StatusCallback = Arc<dyn Fn(&StatusEvent) + Send + Sync>;

#[derive(Default)]
struct CollectorState {
    webhook_clients: Vec<Arc<WebhookClient>>,
    store: Option<Arc<dyn StatusStore>>,
    callback: Option<StatusCallback>,
    history: Vec<StatusEvent>,
    node_started: HashMap<String, Instant>,
    path: Vec<String>,
    usage: UsageAccumulator,
    status: ExecutionStatus,
}

pub struct StatusCollector {
    execution_id: String,
    app_name: String,
    request_id: String,
    started_at: Instant,
    capture_data_flow: bool,
    metrics: Option<CollectorMetrics>,
    telemetry: CollectorTelemetry,
    state: Mutex<CollectorState>,
}

impl StatusCollector {
    /// A collector for a running execution with nothing attached
    pub fn new(
        execution_id: impl Into<String>,
        app_name: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        let execution_id = execution_id.into();
        let app_name = app_name.into();
        let request_id = request_id.into();
        let telemetry = CollectorTelemetry::new(&execution_id, &app_name);
        telemetry.execution_started(&request_id);

        Self {
            execution_id,
            app_name,
            request_id,
            started_at: Instant::now(),
            capture_data_flow: false,
            metrics: None,
            telemetry,
            state: Mutex::new(CollectorState::default()),
        }
    }

    /// Attach node input/output samples to node start/end events
    pub fn with_data_flow_capture(mut self, enabled: bool) -> Self {
        self.capture_data_flow = enabled;
        self
    }

    /// Report into `metrics`; counts this execution as started
    pub fn with_metrics(mut self, metrics: CollectorMetrics) -> Self {
        metrics.execution_started();
        self.metrics = Some(metrics);
        self
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn add_webhook_client(&self, client: impl Into<Arc<WebhookClient>>) {
        self.lock().webhook_clients.push(client.into());
    }

    pub fn set_status_store(&self, store: Arc<dyn StatusStore>) {
        self.lock().store = Some(store);
    }

    pub fn set_status_callback<F>(&self, callback: F)
    where
        F: Fn(&StatusEvent) + Send + Sync + 'static,
    {
        self.lock().callback = Some(Arc::new(callback));
    }

    pub async fn on_node_start(
        &self,
        ctx: &Context,
        node_key: &str,
        node_type: &str,
        input: Option<&Value>,
    ) {
        {
            let mut state = self.lock();
            state.node_started.insert(node_key.to_string(), Instant::now());
            state.path.push(node_key.to_string());
        }

        let mut event = self
            .event(EventType::NodeStart, EventStatus::Running)
            .with_node(node_key, node_type);
        if self.capture_data_flow {
            let (input_count, input_data) = sample(input);
            event = event.with_data_flow(DataFlowStatus {
                input_count,
                input_data,
                ..DataFlowStatus::default()
            });
        }
        self.dispatch(ctx, event).await;
    }

    pub async fn on_node_end(
        &self,
        ctx: &Context,
        node_key: &str,
        node_type: &str,
        output: Option<&Value>,
        err: Option<&NodeError>,
    ) {
        let started = self.lock().node_started.remove(node_key);
        let error = err.map(|e| e.to_string());
        self.telemetry.node_finished(
            node_key,
            started.map(|t| t.elapsed()),
            error.as_deref(),
        );

        let mut event = self
            .event(EventType::NodeEnd, EventStatus::Success)
            .with_node(node_key, node_type);
        if let Some(error) = error {
            event = event.with_error(error);
        }
        if self.capture_data_flow {
            let (output_count, output_data) = sample(output);
            event = event.with_data_flow(DataFlowStatus {
                output_count,
                output_data,
                ..DataFlowStatus::default()
            });
        }
        self.dispatch(ctx, event).await;
    }

    /// Finish the execution. A result is stored before the complete event
    /// is dispatched.
    pub async fn on_complete(
        &self,
        ctx: &Context,
        result: Option<Message>,
        err: Option<&NodeError>,
    ) {
        if let Some(result) = result {
            self.store_result(ctx, &result).await;
        }

        let path = self.lock().path.clone();
        let mut event = self
            .event(EventType::Complete, EventStatus::Success)
            .with_control_flow(ControlFlowStatus {
                path,
                ..ControlFlowStatus::default()
            });
        if let Some(err) = err {
            event = event.with_error(err.to_string());
        }
        self.dispatch(ctx, event).await;
    }

    /// Report data moving through a node outside its start/end hooks
    pub async fn on_data_flow(
        &self,
        ctx: &Context,
        node_key: &str,
        node_type: &str,
        data_flow: DataFlowStatus,
    ) {
        let event = self
            .event(EventType::DataFlow, EventStatus::Running)
            .with_node(node_key, node_type)
            .with_data_flow(data_flow);
        self.dispatch(ctx, event).await;
    }

    /// Report a branch decision, with the path taken so far
    pub async fn on_branch(
        &self,
        ctx: &Context,
        branch_from: &str,
        branch_to: &str,
        condition: Option<&str>,
    ) {
        let path = self.lock().path.clone();
        let event = self
            .event(EventType::ControlFlow, EventStatus::Success)
            .with_control_flow(ControlFlowStatus {
                branch_from: Some(branch_from.to_string()),
                branch_to: Some(branch_to.to_string()),
                condition: condition.map(str::to_string),
                path,
            });
        self.dispatch(ctx, event).await;
    }

    /// Report an error raised by a node that does not end it
    pub async fn on_error(&self, ctx: &Context, node_key: &str, node_type: &str, err: &NodeError) {
        let event = self
            .event(EventType::Error, EventStatus::Error)
            .with_node(node_key, node_type)
            .with_error(err.to_string());
        self.dispatch(ctx, event).await;
    }

    pub fn collect_token_usage(&self, node_key: &str, usage: Option<Usage>) {
        self.lock().usage.collect(node_key, usage);
    }

    /// Sum of all usage collected, `None` until something was counted
    pub fn get_total_usage(&self) -> Option<Usage> {
        self.lock().usage.total()
    }

    pub fn node_usage(&self, node_key: &str) -> Option<Usage> {
        self.lock().usage.node(node_key)
    }

    /// Every event dispatched so far, in dispatch order
    pub fn history(&self) -> Vec<StatusEvent> {
        self.lock().history.clone()
    }

    pub fn status(&self) -> ExecutionStatus {
        self.lock().status
    }

    /// Node keys in the order they started
    pub fn path(&self) -> Vec<String> {
        self.lock().path.clone()
    }

    fn lock(&self) -> MutexGuard<'_, CollectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn event(&self, event_type: EventType, status: EventStatus) -> StatusEvent {
        StatusEvent::new(
            event_type,
            status,
            &self.execution_id,
            &self.app_name,
            &self.request_id,
        )
    }

    async fn store_result(&self, ctx: &Context, result: &Message) {
        let Some(store) = self.lock().store.clone() else {
            return;
        };
        let failure = match ctx.run(store.set_result(&self.execution_id, result)).await {
            Ok(Ok(true)) => return,
            Ok(Ok(false)) => "unknown execution".to_string(),
            Ok(Err(e)) => e.to_string(),
            Err(e) => e.to_string(),
        };
        warn!(execution_id = %self.execution_id, reason = %failure, "Failed to store result");
    }

    async fn dispatch(&self, ctx: &Context, event: StatusEvent) {
        let (callback, store, clients, finished) = {
            let mut state = self.lock();
            state.history.push(event.clone());
            let finished = if event.is_complete() && !state.status.is_terminal() {
                state.status = match event.status {
                    EventStatus::Error => ExecutionStatus::Failed,
                    _ => ExecutionStatus::Completed,
                };
                Some(state.status)
            } else {
                None
            };
            (
                state.callback.clone(),
                state.store.clone(),
                state.webhook_clients.clone(),
                finished,
            )
        };

        debug!(
            execution_id = %self.execution_id,
            event_type = %event.event_type,
            node_key = ?event.node_key,
            "Dispatching status event"
        );
        if let Some(metrics) = &self.metrics {
            metrics.event_dispatched(event.event_type.as_str());
        }
        if let Some(status) = finished {
            let elapsed = self.started_at.elapsed();
            self.telemetry.execution_finished(status, elapsed);
            if let Some(metrics) = &self.metrics {
                metrics.execution_finished(status.as_str(), elapsed.as_secs_f64());
            }
        }

        if let Some(callback) = callback {
            callback(&event);
        }

        if let Some(store) = store {
            let failure = match ctx.run(store.add_status(&self.execution_id, &event)).await {
                Ok(Ok(true)) => None,
                Ok(Ok(false)) => Some("unknown execution".to_string()),
                Ok(Err(e)) => Some(e.to_string()),
                Err(e) => Some(e.to_string()),
            };
            if let Some(reason) = failure {
                self.telemetry.store_write_failed(&event, &reason);
                if let Some(metrics) = &self.metrics {
                    metrics.store_write_failed();
                }
            }
        }

        if !clients.is_empty() {
            self.fan_out(ctx.clone(), clients, event);
        }
    }

    fn fan_out(&self, ctx: Context, clients: Vec<Arc<WebhookClient>>, event: StatusEvent) {
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            for client in clients {
                if !client.accepts(event.event_type) {
                    continue;
                }
                let delivered = match client.send_status(&ctx, &event).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(
                            execution_id = %event.execution_id,
                            event_type = %event.event_type,
                            url = %client.config().url,
                            error = %e,
                            "Webhook delivery dropped"
                        );
                        false
                    }
                };
                if let Some(metrics) = &metrics {
                    metrics.webhook_delivered(delivered);
                }
            }
        });
    }
}

impl std::fmt::Debug for StatusCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusCollector")
            .field("execution_id", &self.execution_id)
            .field("app_name", &self.app_name)
            .field("request_id", &self.request_id)
            .field("status", &self.status())
            .finish()
    }
}

/// Count and copy of a node input or output; arrays count their items
fn sample(value: Option<&Value>) -> (usize, Vec<Value>) {
    match value {
        None | Some(Value::Null) => (0, Vec::new()),
        Some(Value::Array(items)) => (items.len(), items.clone()),
        Some(value) => (1, vec![value.clone()]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn collector() -> StatusCollector {
        StatusCollector::new("e1", "appA", "r1")
    }

    #[tokio::test]
    async fn test_history_follows_hook_order() {
        let c = collector();
        let ctx = Context::background();

        c.on_node_start(&ctx, "n1", "llm", None).await;
        c.on_node_end(&ctx, "n1", "llm", Some(&json!("hi")), None).await;
        c.on_complete(&ctx, None, None).await;

        let kinds: Vec<_> = c.history().iter().map(|e| e.event_type).collect();
        assert_eq!(
            kinds,
            vec![EventType::NodeStart, EventType::NodeEnd, EventType::Complete]
        );
        assert_eq!(c.status(), ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_node_error_is_recorded_not_raised() {
        let c = collector();
        let ctx = Context::background();
        let boom = io::Error::other("boom");

        c.on_node_start(&ctx, "n1", "tool", None).await;
        c.on_node_end(&ctx, "n1", "tool", None, Some(&boom)).await;
        c.on_complete(&ctx, None, Some(&boom)).await;

        let history = c.history();
        assert_eq!(history[1].status, EventStatus::Error);
        assert_eq!(history[1].error.as_deref(), Some("boom"));
        assert_eq!(history[2].status, EventStatus::Error);
        assert_eq!(c.status(), ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn test_complete_carries_path_snapshot() {
        let c = collector();
        let ctx = Context::background();

        for key in ["a", "b", "c"] {
            c.on_node_start(&ctx, key, "llm", None).await;
        }
        c.on_complete(&ctx, None, None).await;
        c.on_node_start(&ctx, "late", "llm", None).await;

        let complete = c.history()[3].clone();
        let path = complete.control_flow.unwrap().path;
        assert_eq!(path, vec!["a", "b", "c"]);
        assert_eq!(c.path(), vec!["a", "b", "c", "late"]);
    }

    #[tokio::test]
    async fn test_second_complete_does_not_change_status() {
        let c = collector();
        let ctx = Context::background();

        c.on_complete(&ctx, None, None).await;
        c.on_complete(&ctx, None, Some(&io::Error::other("late"))).await;

        assert_eq!(c.history().len(), 2);
        assert_eq!(c.status(), ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_callback_sees_every_event() {
        let c = collector();
        let ctx = Context::background();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        c.set_status_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        c.on_node_start(&ctx, "n1", "llm", None).await;
        c.on_branch(&ctx, "n1", "n2", Some("score > 0.5")).await;
        c.on_error(&ctx, "n2", "tool", &io::Error::other("retrying")).await;
        c.on_complete(&ctx, None, None).await;

        assert_eq!(seen.load(Ordering::SeqCst), 4);
        let branch = c.history()[1].control_flow.clone().unwrap();
        assert_eq!(branch.branch_to.as_deref(), Some("n2"));
        assert_eq!(branch.condition.as_deref(), Some("score > 0.5"));
        assert_eq!(branch.path, vec!["n1"]);
    }

    #[tokio::test]
    async fn test_data_flow_capture() {
        let c = collector().with_data_flow_capture(true);
        let ctx = Context::background();

        c.on_node_start(&ctx, "n1", "llm", Some(&json!([1, 2]))).await;
        c.on_node_end(&ctx, "n1", "llm", Some(&json!({"text": "ok"})), None)
            .await;

        let history = c.history();
        let start = history[0].data_flow.clone().unwrap();
        assert_eq!(start.input_count, 2);
        assert_eq!(start.input_data, vec![json!(1), json!(2)]);
        let end = history[1].data_flow.clone().unwrap();
        assert_eq!(end.output_count, 1);
        assert_eq!(end.output_data, vec![json!({"text": "ok"})]);
    }

    #[tokio::test]
    async fn test_data_flow_omitted_by_default() {
        let c = collector();
        c.on_node_start(&Context::background(), "n1", "llm", Some(&json!("x")))
            .await;
        assert!(c.history()[0].data_flow.is_none());
    }

    #[tokio::test]
    async fn test_explicit_data_flow_event() {
        let c = collector();
        let flow = DataFlowStatus {
            input_count: 3,
            output_count: 1,
            ..DataFlowStatus::default()
        };
        c.on_data_flow(&Context::background(), "n1", "merge", flow.clone())
            .await;

        let event = &c.history()[0];
        assert_eq!(event.event_type, EventType::DataFlow);
        assert_eq!(event.node_key.as_deref(), Some("n1"));
        assert_eq!(event.data_flow.as_ref(), Some(&flow));
        assert_eq!(c.status(), ExecutionStatus::Running);
    }

    #[test]
    fn test_usage_accessors() {
        let c = collector();
        assert_eq!(c.get_total_usage(), None);

        c.collect_token_usage("n1", Some(Usage::new(3, 4, 7)));
        c.collect_token_usage("n1", Some(Usage::new(1, 1, 2)));
        c.collect_token_usage("n2", None);

        assert_eq!(c.get_total_usage(), Some(Usage::new(4, 5, 9)));
        assert_eq!(c.node_usage("n1"), Some(Usage::new(1, 1, 2)));
        assert_eq!(c.node_usage("n2"), None);
    }
}
