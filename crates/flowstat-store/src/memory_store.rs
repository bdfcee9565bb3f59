//! In-process status store
//!
//! One coarse lock guards the id → record map; each record has its own lock
//! so appends to different executions never contend. Nothing survives a
//! restart.

use crate::error::{Result, StoreError};
use crate::metrics::{self, OperationTimer};
use crate::status_store::{page_window, StatusStore};
use async_trait::async_trait;
use flowstat_core::{ExecutionRecord, Message, StatusEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

const BACKEND: &str = "memory";

type RecordHandle = Arc<Mutex<ExecutionRecord>>;

pub struct MemoryStore {
    executions: RwLock<HashMap<String, RecordHandle>>,
    /// Advisory; exceeding it is logged, records are never evicted
    max_records: usize,
}

impl MemoryStore {
    pub fn new(max_records: usize) -> Self {
        metrics::register_metrics();
        Self {
            executions: RwLock::new(HashMap::new()),
            max_records,
        }
    }

    async fn handle(&self, execution_id: &str) -> Option<RecordHandle> {
        self.executions.read().await.get(execution_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.executions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.executions.read().await.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(flowstat_core::config::DEFAULT_MAX_RECORDS)
    }
}

#[async_trait]
impl StatusStore for MemoryStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn create_execution(
        &self,
        execution_id: &str,
        app_name: &str,
        request_id: &str,
    ) -> Result<ExecutionRecord> {
        let _timer = OperationTimer::new("create_execution", BACKEND);
        let record = ExecutionRecord::new(execution_id, app_name, request_id);

        let mut executions = self.executions.write().await;
        if executions.contains_key(execution_id) {
            return Err(StoreError::AlreadyExists(execution_id.to_string()));
        }
        if executions.len() >= self.max_records {
            warn!(
                records = executions.len(),
                max_records = self.max_records,
                "In-memory status store is over its configured size"
            );
        }
        executions.insert(
            execution_id.to_string(),
            Arc::new(Mutex::new(record.clone())),
        );
        drop(executions);

        metrics::record_execution_created();
        debug!(execution_id = %execution_id, app_name = %app_name, "Created execution record");
        Ok(record)
    }

    async fn get_execution(&self, execution_id: &str) -> Result<Option<ExecutionRecord>> {
        let _timer = OperationTimer::new("get_execution", BACKEND);
        match self.handle(execution_id).await {
            Some(handle) => Ok(Some(handle.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn add_status(&self, execution_id: &str, event: &StatusEvent) -> Result<bool> {
        let _timer = OperationTimer::new("add_status", BACKEND);
        let Some(handle) = self.handle(execution_id).await else {
            metrics::record_event_rejected();
            return Ok(false);
        };

        let mut record = handle.lock().await;
        let finished = record.apply_event(event.clone());
        metrics::record_event_appended(event.event_type.as_str());
        if finished {
            metrics::record_execution_finished(record.status.as_str());
            debug!(execution_id = %execution_id, status = %record.status, "Execution finished");
        }
        Ok(true)
    }

    async fn set_result(&self, execution_id: &str, result: &Message) -> Result<bool> {
        let _timer = OperationTimer::new("set_result", BACKEND);
        let Some(handle) = self.handle(execution_id).await else {
            return Ok(false);
        };
        handle.lock().await.result = Some(result.clone());
        Ok(true)
    }

    async fn list_executions(
        &self,
        page: usize,
        page_size: usize,
    ) -> Result<(Vec<ExecutionRecord>, usize)> {
        let _timer = OperationTimer::new("list_executions", BACKEND);
        let handles: Vec<RecordHandle> = self.executions.read().await.values().cloned().collect();
        let total = handles.len();

        // Order on the immutable keys; only the requested window is cloned.
        let mut keyed = Vec::with_capacity(total);
        for handle in handles {
            let (start_time, execution_id) = {
                let record = handle.lock().await;
                (record.start_time, record.execution_id.clone())
            };
            keyed.push((start_time, execution_id, handle));
        }
        keyed.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let (offset, limit) = page_window(page, page_size);
        let mut page = Vec::with_capacity(limit.min(total));
        for (_, _, handle) in keyed.into_iter().skip(offset).take(limit) {
            page.push(handle.lock().await.clone());
        }
        Ok((page, total))
    }
}
