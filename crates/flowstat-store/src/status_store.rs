use crate::error::Result;
use async_trait::async_trait;
use flowstat_core::{ExecutionRecord, Message, StatusEvent};

/// Persistence contract for executions and their status history.
///
/// Unknown execution ids are reported through the `bool`/`Option` results,
/// never as errors. Errors mean the backend itself failed.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Short backend name used in logs and metric labels
    fn backend(&self) -> &'static str;

    /// Create a running record. Fails with `AlreadyExists` on a duplicate id.
    async fn create_execution(
        &self,
        execution_id: &str,
        app_name: &str,
        request_id: &str,
    ) -> Result<ExecutionRecord>;

    async fn get_execution(&self, execution_id: &str) -> Result<Option<ExecutionRecord>>;

    /// Append an event. A `complete` event also moves a running execution to
    /// completed or failed. Returns false if the execution is unknown.
    async fn add_status(&self, execution_id: &str, event: &StatusEvent) -> Result<bool>;

    /// Record the final output. Returns false if the execution is unknown.
    async fn set_result(&self, execution_id: &str, result: &Message) -> Result<bool>;

    /// One page of executions (1-indexed) plus the total count.
    /// Ordering is backend-specific.
    async fn list_executions(
        &self,
        page: usize,
        page_size: usize,
    ) -> Result<(Vec<ExecutionRecord>, usize)>;
}

/// Offset and limit for a 1-indexed page; pages below 1 are treated as 1
pub fn page_window(page: usize, page_size: usize) -> (usize, usize) {
    let page = page.max(1);
    ((page - 1).saturating_mul(page_size), page_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_window() {
        assert_eq!(page_window(1, 10), (0, 10));
        assert_eq!(page_window(3, 10), (20, 10));
        assert_eq!(page_window(0, 10), (0, 10));
        assert_eq!(page_window(2, 0), (0, 0));
    }
}
