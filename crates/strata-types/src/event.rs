//! Execution event types.
//!
//! Every lifecycle transition of an execution or one of its steps is written
//! to storage as an `ExecutionEvent` and broadcast to live subscribers. The
//! event log plus the latest checkpoint reconstructs an execution's progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of an execution event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    WorkflowStarted,
    WorkflowResumed,
    WorkflowPaused,
    WorkflowCancelled,
    WorkflowCompleted,
    WorkflowFailed,
    StepStarted,
    StepCompleted,
    StepFailed,
}

impl EventType {
    /// The stable wire name stored in the event log.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::WorkflowStarted => "workflow_started",
            EventType::WorkflowResumed => "workflow_resumed",
            EventType::WorkflowPaused => "workflow_paused",
            EventType::WorkflowCancelled => "workflow_cancelled",
            EventType::WorkflowCompleted => "workflow_completed",
            EventType::WorkflowFailed => "workflow_failed",
            EventType::StepStarted => "step_started",
            EventType::StepCompleted => "step_completed",
            EventType::StepFailed => "step_failed",
        }
    }

    /// Whether this event concerns a single step rather than the whole run.
    pub fn is_step_event(&self) -> bool {
        matches!(
            self,
            EventType::StepStarted | EventType::StepCompleted | EventType::StepFailed
        )
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted execution event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    /// UUIDv7 event ID (time-sortable).
    pub id: Uuid,
    /// Execution this event belongs to.
    pub execution_id: Uuid,
    /// What happened.
    pub event_type: EventType,
    /// Structured payload (step key, error, durations, ...).
    pub event_data: serde_json::Value,
    /// When the event was recorded.
    pub created_at: DateTime<Utc>,
}
