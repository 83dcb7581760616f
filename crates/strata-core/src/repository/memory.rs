//! In-memory `WorkflowRepository` implementation.
//!
//! Keeps every record in process memory behind a single `RwLock`. Nothing
//! survives a restart, so this adapter suits tests and embedders that only
//! need the engine's scheduling semantics. Cloning shares the same store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use strata_types::error::RepositoryError;
use strata_types::event::{EventType, ExecutionEvent};
use strata_types::workflow::{
    Checkpoint, Context, StepExecution, StepState, StoredWorkflow, WorkflowDefinition,
    WorkflowExecution, WorkflowState,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::workflow::WorkflowRepository;

#[derive(Default)]
struct Store {
    workflows: HashMap<Uuid, StoredWorkflow>,
    workflow_names: HashMap<String, Uuid>,
    executions: HashMap<Uuid, WorkflowExecution>,
    /// Step executions per execution, in creation order.
    step_executions: HashMap<Uuid, Vec<StepExecution>>,
    events: HashMap<Uuid, Vec<ExecutionEvent>>,
    checkpoints: HashMap<Uuid, Checkpoint>,
    /// Checkpoint IDs per execution, in write order.
    checkpoint_order: HashMap<Uuid, Vec<Uuid>>,
}

/// Process-local repository backed by hash maps.
#[derive(Clone, Default)]
pub struct InMemoryWorkflowRepository {
    store: Arc<RwLock<Store>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn create_workflow(
        &self,
        def: &WorkflowDefinition,
    ) -> Result<StoredWorkflow, RepositoryError> {
        let mut store = self.store.write().await;
        let now = Utc::now();

        if let Some(id) = store.workflow_names.get(&def.name).copied() {
            let stored = store.workflows.get_mut(&id).ok_or(RepositoryError::NotFound)?;
            stored.definition = def.clone();
            stored.updated_at = now;
            return Ok(stored.clone());
        }

        let stored = StoredWorkflow {
            id: Uuid::now_v7(),
            name: def.name.clone(),
            definition: def.clone(),
            created_at: now,
            updated_at: now,
        };
        store.workflow_names.insert(def.name.clone(), stored.id);
        store.workflows.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_workflow_by_name(
        &self,
        name: &str,
    ) -> Result<Option<StoredWorkflow>, RepositoryError> {
        let store = self.store.read().await;
        Ok(store
            .workflow_names
            .get(name)
            .and_then(|id| store.workflows.get(id))
            .cloned())
    }

    async fn get_workflow_by_id(
        &self,
        id: &Uuid,
    ) -> Result<Option<StoredWorkflow>, RepositoryError> {
        Ok(self.store.read().await.workflows.get(id).cloned())
    }

    async fn create_execution(
        &self,
        workflow_id: &Uuid,
        context: &Context,
        triggered_by: &str,
        priority: i32,
        parent_execution_id: Option<&Uuid>,
    ) -> Result<WorkflowExecution, RepositoryError> {
        let mut store = self.store.write().await;
        let definition = store
            .workflows
            .get(workflow_id)
            .map(|stored| stored.definition.clone())
            .ok_or_else(|| {
                RepositoryError::Conflict(format!("workflow {workflow_id} does not exist"))
            })?;

        let execution = WorkflowExecution {
            id: Uuid::now_v7(),
            workflow_id: *workflow_id,
            definition,
            state: WorkflowState::Pending,
            context: context.clone(),
            triggered_by: triggered_by.to_string(),
            priority,
            parent_execution_id: parent_execution_id.copied(),
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            resume_count: 0,
            error: None,
        };
        store.executions.insert(execution.id, execution.clone());
        Ok(execution)
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<WorkflowExecution>, RepositoryError> {
        Ok(self.store.read().await.executions.get(id).cloned())
    }

    async fn update_execution_state(
        &self,
        id: &Uuid,
        state: WorkflowState,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut store = self.store.write().await;
        let execution = store.executions.get_mut(id).ok_or(RepositoryError::NotFound)?;

        execution.state = state;
        execution.error = error.map(str::to_string);
        if state.is_terminal() {
            let now = Utc::now();
            execution.completed_at = Some(now);
            execution.duration_ms =
                Some((now - execution.started_at).num_milliseconds().max(0) as u64);
        } else {
            execution.completed_at = None;
            execution.duration_ms = None;
        }
        Ok(())
    }

    async fn update_execution_context(
        &self,
        id: &Uuid,
        context: &Context,
    ) -> Result<(), RepositoryError> {
        let mut store = self.store.write().await;
        let execution = store.executions.get_mut(id).ok_or(RepositoryError::NotFound)?;
        execution.context = context.clone();
        Ok(())
    }

    async fn increment_resume_count(&self, id: &Uuid) -> Result<u32, RepositoryError> {
        let mut store = self.store.write().await;
        let execution = store.executions.get_mut(id).ok_or(RepositoryError::NotFound)?;
        execution.resume_count += 1;
        Ok(execution.resume_count)
    }

    async fn list_executions_by_state(
        &self,
        state: WorkflowState,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let store = self.store.read().await;
        let mut executions: Vec<WorkflowExecution> = store
            .executions
            .values()
            .filter(|e| e.state == state)
            .cloned()
            .collect();
        executions.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        Ok(executions)
    }

    async fn create_step_execution(
        &self,
        execution_id: &Uuid,
        step_key: &str,
        state: StepState,
        agent: &str,
    ) -> Result<StepExecution, RepositoryError> {
        let mut store = self.store.write().await;
        if !store.executions.contains_key(execution_id) {
            return Err(RepositoryError::NotFound);
        }

        let now = Utc::now();
        let step = StepExecution {
            id: Uuid::now_v7(),
            execution_id: *execution_id,
            step_key: step_key.to_string(),
            agent: agent.to_string(),
            state,
            result: None,
            error: None,
            started_at: (state != StepState::Pending).then_some(now),
            completed_at: state.is_terminal().then_some(now),
        };
        store
            .step_executions
            .entry(*execution_id)
            .or_default()
            .push(step.clone());
        Ok(step)
    }

    async fn update_step_execution_state(
        &self,
        id: &Uuid,
        state: StepState,
        result: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut store = self.store.write().await;
        let step = store
            .step_executions
            .values_mut()
            .flat_map(|steps| steps.iter_mut())
            .find(|s| s.id == *id)
            .ok_or(RepositoryError::NotFound)?;

        let now = Utc::now();
        step.state = state;
        if let Some(result) = result {
            step.result = Some(result.clone());
        }
        if let Some(error) = error {
            step.error = Some(error.to_string());
        }
        if state == StepState::Running && step.started_at.is_none() {
            step.started_at = Some(now);
        }
        if state.is_terminal() {
            step.completed_at = Some(now);
        }
        Ok(())
    }

    async fn list_step_executions(
        &self,
        execution_id: &Uuid,
    ) -> Result<Vec<StepExecution>, RepositoryError> {
        Ok(self
            .store
            .read()
            .await
            .step_executions
            .get(execution_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn log_event(
        &self,
        execution_id: &Uuid,
        event_type: EventType,
        event_data: &serde_json::Value,
    ) -> Result<ExecutionEvent, RepositoryError> {
        let event = ExecutionEvent {
            id: Uuid::now_v7(),
            execution_id: *execution_id,
            event_type,
            event_data: event_data.clone(),
            created_at: Utc::now(),
        };
        self.store
            .write()
            .await
            .events
            .entry(*execution_id)
            .or_default()
            .push(event.clone());
        Ok(event)
    }

    async fn list_events(
        &self,
        execution_id: &Uuid,
    ) -> Result<Vec<ExecutionEvent>, RepositoryError> {
        Ok(self
            .store
            .read()
            .await
            .events
            .get(execution_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), RepositoryError> {
        let mut store = self.store.write().await;
        if store.checkpoints.contains_key(&checkpoint.id) {
            return Err(RepositoryError::Conflict(format!(
                "checkpoint {} already exists",
                checkpoint.id
            )));
        }
        store
            .checkpoint_order
            .entry(checkpoint.execution_id)
            .or_default()
            .push(checkpoint.id);
        store.checkpoints.insert(checkpoint.id, checkpoint.clone());
        Ok(())
    }

    async fn restore_checkpoint(&self, id: &Uuid) -> Result<Option<Checkpoint>, RepositoryError> {
        Ok(self.store.read().await.checkpoints.get(id).cloned())
    }

    async fn latest_checkpoint(
        &self,
        execution_id: &Uuid,
    ) -> Result<Option<Checkpoint>, RepositoryError> {
        let store = self.store.read().await;
        Ok(store
            .checkpoint_order
            .get(execution_id)
            .and_then(|ids| ids.last())
            .and_then(|id| store.checkpoints.get(id))
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
