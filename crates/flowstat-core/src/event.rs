//! Status events
//!
//! A [`StatusEvent`] is one immutable observation of execution progress. The
//! serialized form is the `status` object of a webhook body and the row shape
//! of the durable event log.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of lifecycle observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    NodeStart,
    NodeEnd,
    DataFlow,
    ControlFlow,
    Error,
    Complete,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::NodeStart => "node_start",
            EventType::NodeEnd => "node_end",
            EventType::DataFlow => "data_flow",
            EventType::ControlFlow => "control_flow",
            EventType::Error => "error",
            EventType::Complete => "complete",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node_start" => Ok(EventType::NodeStart),
            "node_end" => Ok(EventType::NodeEnd),
            "data_flow" => Ok(EventType::DataFlow),
            "control_flow" => Ok(EventType::ControlFlow),
            "error" => Ok(EventType::Error),
            "complete" => Ok(EventType::Complete),
            other => Err(format!("unknown event type: {}", other)),
        }
    }
}

/// Outcome carried by an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Running,
    Success,
    Error,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Running => "running",
            EventStatus::Success => "success",
            EventStatus::Error => "error",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(EventStatus::Running),
            "success" => Ok(EventStatus::Success),
            "error" => Ok(EventStatus::Error),
            other => Err(format!("unknown event status: {}", other)),
        }
    }
}

/// Input/output counts and optional samples for a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataFlowStatus {
    pub input_count: usize,
    pub output_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_data: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_data: Vec<serde_json::Value>,
}

/// Branch information and the cumulative execution path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlFlowStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default)]
    pub path: Vec<String>,
}

/// One timestamped observation of an execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub execution_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_flow: Option<DataFlowStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_flow: Option<ControlFlowStatus>,
    pub app_name: String,
    pub request_id: String,
}

impl StatusEvent {
    /// Create an event stamped with the current time
    pub fn new(
        event_type: EventType,
        status: EventStatus,
        execution_id: impl Into<String>,
        app_name: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            timestamp: now_millis(),
            execution_id: execution_id.into(),
            node_key: None,
            node_type: None,
            status,
            error: None,
            data_flow: None,
            control_flow: None,
            app_name: app_name.into(),
            request_id: request_id.into(),
        }
    }

    /// Scope the event to a node
    pub fn with_node(mut self, node_key: impl Into<String>, node_type: impl Into<String>) -> Self {
        self.node_key = Some(node_key.into());
        self.node_type = Some(node_type.into());
        self
    }

    /// Mark the event as failed with the given message
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.status = EventStatus::Error;
        self.error = Some(error.into());
        self
    }

    pub fn with_data_flow(mut self, data_flow: DataFlowStatus) -> Self {
        self.data_flow = Some(data_flow);
        self
    }

    pub fn with_control_flow(mut self, control_flow: ControlFlowStatus) -> Self {
        self.control_flow = Some(control_flow);
        self
    }

    pub fn is_complete(&self) -> bool {
        self.event_type == EventType::Complete
    }
}

/// Current time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let event = StatusEvent::new(EventType::NodeStart, EventStatus::Running, "e1", "appA", "r1")
            .with_node("n1", "llm");
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "node_start");
        assert_eq!(value["status"], "running");
        assert_eq!(value["execution_id"], "e1");
        assert_eq!(value["node_key"], "n1");
        assert_eq!(value["node_type"], "llm");
        assert_eq!(value["app_name"], "appA");
        assert_eq!(value["request_id"], "r1");
        assert!(value.get("error").is_none());
        assert!(value.get("data_flow").is_none());
        assert!(value.get("control_flow").is_none());
    }

    #[test]
    fn test_complete_event_keeps_empty_path() {
        let event = StatusEvent::new(EventType::Complete, EventStatus::Success, "e1", "a", "r")
            .with_control_flow(ControlFlowStatus::default());
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["control_flow"]["path"], serde_json::json!([]));
        assert!(event.is_complete());
    }

    #[test]
    fn test_with_error_sets_status() {
        let event = StatusEvent::new(EventType::NodeEnd, EventStatus::Success, "e1", "a", "r")
            .with_error("boom");
        assert_eq!(event.status, EventStatus::Error);
        assert_eq!(event.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_event_type_parse() {
        for ty in [
            EventType::NodeStart,
            EventType::NodeEnd,
            EventType::DataFlow,
            EventType::ControlFlow,
            EventType::Error,
            EventType::Complete,
        ] {
            assert_eq!(ty.as_str().parse::<EventType>().unwrap(), ty);
        }
        assert!("node_middle".parse::<EventType>().is_err());
    }
}
