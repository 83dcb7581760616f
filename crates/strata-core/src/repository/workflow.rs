//! Workflow repository trait definition.
//!
//! Defines the storage interface for workflow definitions, executions, step
//! executions, the event log, and checkpoints. The infrastructure layer
//! (strata-infra) implements this trait with SQLite persistence.

use strata_types::error::RepositoryError;
use strata_types::event::{EventType, ExecutionEvent};
use strata_types::workflow::{
    Checkpoint, Context, StepExecution, StepState, StoredWorkflow, WorkflowDefinition,
    WorkflowExecution, WorkflowState,
};
use uuid::Uuid;

/// Repository trait for workflow persistence.
///
/// Covers five entity families:
/// - **Workflows:** stored definitions, unique by name.
/// - **Executions:** one record per run attempt.
/// - **Step executions:** one record per step attempt.
/// - **Events:** append-only execution event log.
/// - **Checkpoints:** immutable level-boundary snapshots.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait WorkflowRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Workflows
    // -----------------------------------------------------------------------

    /// Store a definition under its name.
    ///
    /// If the name already exists the stored definition is replaced and the
    /// existing ID is kept, so executions always reference a stable ID.
    fn create_workflow(
        &self,
        def: &WorkflowDefinition,
    ) -> impl std::future::Future<Output = Result<StoredWorkflow, RepositoryError>> + Send;

    /// Get a stored workflow by name.
    fn get_workflow_by_name(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Option<StoredWorkflow>, RepositoryError>> + Send;

    /// Get a stored workflow by ID.
    fn get_workflow_by_id(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<StoredWorkflow>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    /// Create a new execution in the `pending` state.
    fn create_execution(
        &self,
        workflow_id: &Uuid,
        context: &Context,
        triggered_by: &str,
        priority: i32,
        parent_execution_id: Option<&Uuid>,
    ) -> impl std::future::Future<Output = Result<WorkflowExecution, RepositoryError>> + Send;

    /// Get an execution by ID.
    fn get_execution(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<
        Output = Result<Option<WorkflowExecution>, RepositoryError>,
    > + Send;

    /// Update an execution's state and error.
    ///
    /// Terminal states stamp `completed_at` and `duration_ms`; non-terminal
    /// states clear the error. Returns `NotFound` for an unknown ID.
    fn update_execution_state(
        &self,
        id: &Uuid,
        state: WorkflowState,
        error: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Replace an execution's context.
    fn update_execution_context(
        &self,
        id: &Uuid,
        context: &Context,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Increment the resume counter and return the new value.
    fn increment_resume_count(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<u32, RepositoryError>> + Send;

    /// List executions in a given state, oldest first.
    fn list_executions_by_state(
        &self,
        state: WorkflowState,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowExecution>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Step executions
    // -----------------------------------------------------------------------

    /// Create a step execution record.
    fn create_step_execution(
        &self,
        execution_id: &Uuid,
        step_key: &str,
        state: StepState,
        agent: &str,
    ) -> impl std::future::Future<Output = Result<StepExecution, RepositoryError>> + Send;

    /// Update a step execution's state and optionally its result/error.
    ///
    /// `running` stamps `started_at`; terminal states stamp `completed_at`.
    fn update_step_execution_state(
        &self,
        id: &Uuid,
        state: StepState,
        result: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// List all step executions of an execution in creation order.
    fn list_step_executions(
        &self,
        execution_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<StepExecution>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Append an event to the execution's log.
    fn log_event(
        &self,
        execution_id: &Uuid,
        event_type: EventType,
        event_data: &serde_json::Value,
    ) -> impl std::future::Future<Output = Result<ExecutionEvent, RepositoryError>> + Send;

    /// List an execution's events in the order they were written.
    fn list_events(
        &self,
        execution_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<ExecutionEvent>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Checkpoints
    // -----------------------------------------------------------------------

    /// Persist a checkpoint.
    fn create_checkpoint(
        &self,
        checkpoint: &Checkpoint,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Load a checkpoint by ID.
    fn restore_checkpoint(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Checkpoint>, RepositoryError>> + Send;

    /// Newest checkpoint of an execution, if any.
    fn latest_checkpoint(
        &self,
        execution_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Checkpoint>, RepositoryError>> + Send;
}
