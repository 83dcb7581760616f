//! Workflow domain types for Strata.
//!
//! Defines the authored shape of a workflow (`WorkflowDefinition`,
//! `StepDefinition`) and the mutable records the orchestrator keeps while
//! running one (`WorkflowExecution`, `StepExecution`, `Checkpoint`), together
//! with the read models returned to callers (`ExecutionSummary`,
//! `WorkflowResult`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Flat key/value context carried through an execution.
pub type Context = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Workflow Definition
// ---------------------------------------------------------------------------

/// A declarative workflow: named steps wired together by dependencies.
///
/// Authored externally and immutable once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique, human-chosen workflow name.
    pub name: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Steps forming the dependency graph.
    pub steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    /// Look up a step by key.
    pub fn step(&self, key: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.key == key)
    }
}

/// A single step in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Step key, unique within the workflow (e.g. "fetch").
    pub key: String,
    /// Opaque identifier of the executor/agent that runs this step.
    pub agent: String,
    /// Instruction template; `{{ key }}` placeholders resolve against the
    /// running context and prior step results.
    pub instruction: String,
    /// Keys of the steps this step depends on.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// When true, a failure is recorded but does not abort the workflow.
    #[serde(default)]
    pub optional: bool,
    /// Step-level timeout in seconds (falls back to the configured default).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl StepDefinition {
    /// Build a required step with no dependencies.
    pub fn new(
        key: impl Into<String>,
        agent: impl Into<String>,
        instruction: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            agent: agent.into(),
            instruction: instruction.into(),
            depends_on: Vec::new(),
            optional: false,
            timeout_secs: None,
        }
    }

    /// Add dependencies.
    pub fn depends_on<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Mark the step optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// A definition as persisted by storage, with its stable ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredWorkflow {
    /// UUIDv7 assigned on first save; stable across re-saves of the same name.
    pub id: Uuid,
    /// Workflow name (denormalized from the definition).
    pub name: String,
    /// The definition executions of this workflow run against.
    pub definition: WorkflowDefinition,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// Lifecycle state of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Pending,
    Executing,
    Paused,
    Cancelled,
    Completed,
    Failed,
}

impl WorkflowState {
    /// Terminal states admit no further transition through normal operations.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowState::Completed | WorkflowState::Cancelled | WorkflowState::Failed
        )
    }

    /// The snake_case name used in storage and events.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Pending => "pending",
            WorkflowState::Executing => "executing",
            WorkflowState::Paused => "paused",
            WorkflowState::Cancelled => "cancelled",
            WorkflowState::Completed => "completed",
            WorkflowState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a single step attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepState::Completed | StepState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepState::Pending => "pending",
            StepState::Running => "running",
            StepState::Completed => "completed",
            StepState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for StepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Execution records
// ---------------------------------------------------------------------------

/// One run attempt of a workflow. Mutated only by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// UUIDv7 execution ID.
    pub id: Uuid,
    /// ID of the stored workflow being executed.
    pub workflow_id: Uuid,
    /// Definition this execution runs against, copied from the stored
    /// workflow when the execution is created. Re-saving the workflow
    /// does not change it.
    pub definition: WorkflowDefinition,
    /// Current state.
    pub state: WorkflowState,
    /// Context merged with step results as they complete.
    pub context: Context,
    /// Who or what started the run (e.g. "manual", "cron").
    pub triggered_by: String,
    /// Caller-assigned priority (higher runs first where a caller queues runs).
    pub priority: i32,
    /// Execution that spawned this one, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_execution_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Number of times this execution has been resumed.
    pub resume_count: u32,
    /// Error message if the execution failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One attempt of one step within an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    /// UUIDv7 step execution ID.
    pub id: Uuid,
    /// Parent execution ID.
    pub execution_id: Uuid,
    /// Key matching `StepDefinition.key`.
    pub step_key: String,
    /// Agent the step was dispatched to (denormalized).
    pub agent: String,
    pub state: StepState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Point-in-time snapshot of an execution's progress, written at level
/// boundaries only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// UUIDv7 checkpoint ID.
    pub id: Uuid,
    pub execution_id: Uuid,
    /// Context merged with every step result collected so far.
    pub context_snapshot: Context,
    /// Steps whose whole level has settled successfully, in topological order.
    pub completed_steps: Vec<String>,
    /// Remaining topological order minus `completed_steps`.
    pub pending_steps: Vec<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Read models
// ---------------------------------------------------------------------------

/// Caller-supplied options for starting a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteOptions {
    /// Initial context.
    #[serde(default)]
    pub context: Context,
    #[serde(default = "default_triggered_by")]
    pub triggered_by: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_execution_id: Option<Uuid>,
}

fn default_triggered_by() -> String {
    "manual".to_string()
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            context: Context::new(),
            triggered_by: default_triggered_by(),
            priority: 0,
            parent_execution_id: None,
        }
    }
}

/// Aggregated status of an execution and its step attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub state: WorkflowState,
    pub steps_completed: usize,
    pub steps_failed: usize,
    pub steps_running: usize,
    /// Number of steps in the definition.
    pub steps_total: usize,
    pub resume_count: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of `execute_workflow` / `resume_workflow`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    /// Workflow name.
    pub name: String,
    /// Final state of this call: completed, paused, or cancelled.
    pub state: WorkflowState,
    /// Context merged with every step result.
    pub context: Context,
    /// Results of completed steps keyed by step key.
    pub step_results: Context,
    /// Optional steps that failed during this call.
    pub failed_steps: Vec<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
