//! Scripted `StepExecutor` and gated repository shared by the engine tests.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use strata_types::error::RepositoryError;
use strata_types::event::{EventType, ExecutionEvent};
use strata_types::workflow::{
    Checkpoint, Context, StepExecution, StepState, StoredWorkflow, WorkflowDefinition,
    WorkflowExecution, WorkflowState,
};
use tokio::sync::{mpsc, Barrier, Notify};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::step_runner::{StepError, StepExecutor, StepMeta};
use crate::repository::memory::InMemoryWorkflowRepository;
use crate::repository::workflow::WorkflowRepository;

/// What the executor does for a given step key.
#[derive(Clone)]
pub enum Behavior {
    /// Return `{"step": key, "instruction": rendered}`.
    Succeed,
    /// Return this value.
    Return(Value),
    /// Fail with `ExecutionFailed`.
    Fail(String),
    /// Sleep, ignoring cancellation, then succeed.
    Sleep(Duration),
    /// Wait on the barrier, then succeed.
    Barrier(Arc<Barrier>),
    /// Signal `started`, then wait for cancellation.
    Block(Arc<Notify>),
    /// Panic inside the executor.
    Panic,
}

#[derive(Default)]
pub struct ScriptedExecutor {
    behaviors: Mutex<HashMap<String, Behavior>>,
    /// (key, rendered instruction) in call order.
    calls: Mutex<Vec<(String, String)>>,
    /// "start:key" / "end:key" entries.
    trace: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(key.to_string(), behavior);
    }

    /// Make `key` block until cancelled; the returned handle fires once the
    /// step has started.
    pub fn block(&self, key: &str) -> Arc<Notify> {
        let started = Arc::new(Notify::new());
        self.set(key, Behavior::Block(Arc::clone(&started)));
        started
    }

    pub fn call_count(&self, key: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == key)
            .count()
    }

    /// Keys in the order the executor was called.
    pub fn called_keys(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Latest rendered instruction for `key`.
    pub fn instruction_for(&self, key: &str) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, i)| i.clone())
    }

    pub fn trace(&self) -> Vec<String> {
        self.trace.lock().unwrap().clone()
    }

    /// Position of `entry` in the trace.
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.trace.lock().unwrap().iter().position(|e| e == entry)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn behavior(&self, key: &str) -> Behavior {
        self.behaviors
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or(Behavior::Succeed)
    }
}

impl StepExecutor for ScriptedExecutor {
    fn execute<'a>(
        &'a self,
        instruction: &'a str,
        meta: &'a StepMeta,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Value, StepError>> + Send + 'a>> {
        Box::pin(async move {
            let behavior = self.behavior(&meta.key);
            self.calls
                .lock()
                .unwrap()
                .push((meta.key.clone(), instruction.to_string()));
            self.trace.lock().unwrap().push(format!("start:{}", meta.key));
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let echo = json!({"step": meta.key, "instruction": instruction});
            let result = match behavior {
                Behavior::Succeed => Ok(echo),
                Behavior::Return(value) => Ok(value),
                Behavior::Fail(message) => Err(StepError::ExecutionFailed(message)),
                Behavior::Sleep(duration) => {
                    tokio::time::sleep(duration).await;
                    Ok(echo)
                }
                Behavior::Barrier(barrier) => {
                    barrier.wait().await;
                    Ok(echo)
                }
                Behavior::Block(started) => {
                    started.notify_one();
                    cancel.cancelled().await;
                    Err(StepError::Interrupted)
                }
                Behavior::Panic => panic!("scripted panic in step '{}'", meta.key),
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.trace.lock().unwrap().push(format!("end:{}", meta.key));
            result
        })
    }
}

/// In-memory repository whose `create_execution` stores the execution, then
/// waits for `release()` before returning.
pub struct GatedRepository {
    pub inner: InMemoryWorkflowRepository,
    created_tx: mpsc::UnboundedSender<Uuid>,
    created_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Uuid>>,
    release: Notify,
}

impl GatedRepository {
    pub fn new() -> Self {
        let (created_tx, created_rx) = mpsc::unbounded_channel();
        Self {
            inner: InMemoryWorkflowRepository::new(),
            created_tx,
            created_rx: tokio::sync::Mutex::new(created_rx),
            release: Notify::new(),
        }
    }

    /// Wait until an execution has been stored and is held at the gate.
    pub async fn created(&self) -> Uuid {
        self.created_rx.lock().await.recv().await.unwrap()
    }

    /// Let the held `create_execution` call return.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

impl WorkflowRepository for GatedRepository {
    async fn create_workflow(
        &self,
        def: &WorkflowDefinition,
    ) -> Result<StoredWorkflow, RepositoryError> {
        self.inner.create_workflow(def).await
    }

    async fn get_workflow_by_name(
        &self,
        name: &str,
    ) -> Result<Option<StoredWorkflow>, RepositoryError> {
        self.inner.get_workflow_by_name(name).await
    }

    async fn get_workflow_by_id(
        &self,
        id: &Uuid,
    ) -> Result<Option<StoredWorkflow>, RepositoryError> {
        self.inner.get_workflow_by_id(id).await
    }

    async fn create_execution(
        &self,
        workflow_id: &Uuid,
        context: &Context,
        triggered_by: &str,
        priority: i32,
        parent_execution_id: Option<&Uuid>,
    ) -> Result<WorkflowExecution, RepositoryError> {
        let execution = self
            .inner
            .create_execution(workflow_id, context, triggered_by, priority, parent_execution_id)
            .await?;
        let _ = self.created_tx.send(execution.id);
        self.release.notified().await;
        Ok(execution)
    }

    async fn get_execution(
        &self,
        id: &Uuid,
    ) -> Result<Option<WorkflowExecution>, RepositoryError> {
        self.inner.get_execution(id).await
    }

    async fn update_execution_state(
        &self,
        id: &Uuid,
        state: WorkflowState,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        self.inner.update_execution_state(id, state, error).await
    }

    async fn update_execution_context(
        &self,
        id: &Uuid,
        context: &Context,
    ) -> Result<(), RepositoryError> {
        self.inner.update_execution_context(id, context).await
    }

    async fn increment_resume_count(&self, id: &Uuid) -> Result<u32, RepositoryError> {
        self.inner.increment_resume_count(id).await
    }

    async fn list_executions_by_state(
        &self,
        state: WorkflowState,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        self.inner.list_executions_by_state(state).await
    }

    async fn create_step_execution(
        &self,
        execution_id: &Uuid,
        step_key: &str,
        state: StepState,
        agent: &str,
    ) -> Result<StepExecution, RepositoryError> {
        self.inner
            .create_step_execution(execution_id, step_key, state, agent)
            .await
    }

    async fn update_step_execution_state(
        &self,
        id: &Uuid,
        state: StepState,
        result: Option<&Value>,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        self.inner
            .update_step_execution_state(id, state, result, error)
            .await
    }

    async fn list_step_executions(
        &self,
        execution_id: &Uuid,
    ) -> Result<Vec<StepExecution>, RepositoryError> {
        self.inner.list_step_executions(execution_id).await
    }

    async fn log_event(
        &self,
        execution_id: &Uuid,
        event_type: EventType,
        event_data: &Value,
    ) -> Result<ExecutionEvent, RepositoryError> {
        self.inner.log_event(execution_id, event_type, event_data).await
    }

    async fn list_events(
        &self,
        execution_id: &Uuid,
    ) -> Result<Vec<ExecutionEvent>, RepositoryError> {
        self.inner.list_events(execution_id).await
    }

    async fn create_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), RepositoryError> {
        self.inner.create_checkpoint(checkpoint).await
    }

    async fn restore_checkpoint(&self, id: &Uuid) -> Result<Option<Checkpoint>, RepositoryError> {
        self.inner.restore_checkpoint(id).await
    }

    async fn latest_checkpoint(
        &self,
        execution_id: &Uuid,
    ) -> Result<Option<Checkpoint>, RepositoryError> {
        self.inner.latest_checkpoint(execution_id).await
    }
}
