//! Execution records
//!
//! An execution is one run of a workflow graph. Its record is owned by a
//! status store; everything else holds the `execution_id` only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::event::{EventStatus, StatusEvent};

/// Lifecycle status of an execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Nodes are still executing
    #[default]
    Running,
    /// Completed successfully
    Completed,
    /// Completed with an error
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            other => Err(format!("unknown execution status: {}", other)),
        }
    }
}

/// Final output message of an execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// user | assistant | system
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// Snapshot of one execution and its event history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub app_name: String,
    pub request_id: String,
    pub start_time: DateTime<Utc>,
    /// Unset until the execution reaches a terminal status
    pub end_time: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub status_history: Vec<StatusEvent>,
    pub result: Option<Message>,
    /// Set iff `status` is failed
    pub error: Option<String>,
}

impl ExecutionRecord {
    /// Create a running record started now
    pub fn new(
        execution_id: impl Into<String>,
        app_name: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            app_name: app_name.into(),
            request_id: request_id.into(),
            start_time: Utc::now(),
            end_time: None,
            status: ExecutionStatus::Running,
            status_history: Vec::new(),
            result: None,
            error: None,
        }
    }

    /// Append an event, applying the terminal transition for `complete`.
    ///
    /// Once terminal, the status, error and end time no longer change; later
    /// events are still appended to the history. Returns true when this call
    /// made the record terminal.
    pub fn apply_event(&mut self, event: StatusEvent) -> bool {
        let mut finished = false;
        if event.is_complete() && !self.status.is_terminal() {
            if event.status == EventStatus::Error {
                self.status = ExecutionStatus::Failed;
                self.error = Some(event.error.clone().unwrap_or_default());
            } else {
                self.status = ExecutionStatus::Completed;
            }
            self.end_time = Some(Utc::now());
            finished = true;
        }
        self.status_history.push(event);
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;

    fn complete(status: EventStatus) -> StatusEvent {
        StatusEvent::new(EventType::Complete, status, "e1", "a", "r")
    }

    #[test]
    fn test_complete_success_transitions() {
        let mut record = ExecutionRecord::new("e1", "a", "r");
        assert!(record.apply_event(complete(EventStatus::Success)));
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert!(record.end_time.is_some());
        assert!(record.error.is_none());
    }

    #[test]
    fn test_complete_error_transitions_to_failed() {
        let mut record = ExecutionRecord::new("e1", "a", "r");
        record.apply_event(complete(EventStatus::Success).with_error("boom"));
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_second_complete_keeps_terminal_fields() {
        let mut record = ExecutionRecord::new("e1", "a", "r");
        record.apply_event(complete(EventStatus::Success).with_error("boom"));
        let end_time = record.end_time;

        assert!(!record.apply_event(complete(EventStatus::Success)));
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("boom"));
        assert_eq!(record.end_time, end_time);
        assert_eq!(record.status_history.len(), 2);
    }

    #[test]
    fn test_node_events_do_not_finish() {
        let mut record = ExecutionRecord::new("e1", "a", "r");
        let event = StatusEvent::new(EventType::NodeEnd, EventStatus::Error, "e1", "a", "r");
        assert!(!record.apply_event(event));
        assert_eq!(record.status, ExecutionStatus::Running);
        assert!(record.end_time.is_none());
    }
}
