//! Workflow orchestrator: level-by-level parallel execution with durable
//! checkpoints, pause/cancel and resume.
//!
//! # Execution flow
//!
//! 1. Validate the definition, store it, and create a `WorkflowExecution`.
//! 2. Compile the dependency graph into parallel levels.
//! 3. Emit `workflow_started`, write the initial checkpoint, go `executing`.
//! 4. For each level: check for pause/cancel, run every not-yet-completed
//!    step concurrently (`JoinSet`, bounded by a shared `Semaphore`), wait
//!    for all of them, then checkpoint.
//! 5. Mark the execution `completed` (or `failed` on a required-step failure).
//!
//! State mutations for one execution are serialised through a per-execution
//! mutex; the mutex is never held while steps run.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Value};
use strata_types::config::OrchestratorConfig;
use strata_types::error::RepositoryError;
use strata_types::event::EventType;
use strata_types::workflow::{
    Checkpoint, Context, ExecuteOptions, ExecutionSummary, StepDefinition, StepState,
    WorkflowDefinition, WorkflowExecution, WorkflowResult, WorkflowState,
};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::event::bus::EventBus;
use crate::event::recorder::EventRecorder;
use crate::repository::workflow::WorkflowRepository;

use super::checkpoint::{pending_steps, CheckpointError, CheckpointManager};
use super::graph::{build_dependency_graph, validate, DependencyGraph, ValidationError};
use super::step_runner::{StepError, StepExecutionError, StepExecutor, StepRunner};
use super::template::merge_context;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by orchestrator operations.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The operation is not allowed in the execution's current state.
    #[error("cannot {operation} execution {execution_id} in state '{state}'")]
    InvalidState {
        execution_id: Uuid,
        state: WorkflowState,
        operation: &'static str,
    },

    /// A required step failed; the execution is now `failed`.
    #[error("step '{step_key}' failed: {error}")]
    StepFailed { step_key: String, error: String },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),

    #[error("no checkpoint found for execution {0}")]
    CheckpointNotFound(Uuid),

    /// A step task could not be joined.
    #[error("step task error: {0}")]
    Task(String),
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Mutable state of one `execute`/`resume` call.
struct Run<'a> {
    execution_id: Uuid,
    def: &'a WorkflowDefinition,
    graph: DependencyGraph,
    context: Context,
    step_results: Context,
    completed: HashSet<String>,
    failed_steps: Vec<String>,
    token: CancellationToken,
}

/// Marks an execution as running in this process until dropped.
struct Registration<'a> {
    running: &'a DashMap<Uuid, CancellationToken>,
    execution_id: Uuid,
}

impl<'a> Registration<'a> {
    fn new(
        running: &'a DashMap<Uuid, CancellationToken>,
        execution_id: Uuid,
        token: CancellationToken,
    ) -> Self {
        running.insert(execution_id, token);
        Self {
            running,
            execution_id,
        }
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.running.remove(&self.execution_id);
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives workflow executions against a repository and a step executor.
///
/// Generic over `R: WorkflowRepository` for storage flexibility. Share it
/// behind an `Arc` to pause or cancel from other tasks while a run is in
/// progress.
pub struct Orchestrator<R: WorkflowRepository> {
    repo: Arc<R>,
    recorder: EventRecorder<R>,
    checkpoints: CheckpointManager<R>,
    runner: Arc<StepRunner<R>>,
    /// Bounds in-flight executor calls across all executions.
    semaphore: Arc<Semaphore>,
    config: OrchestratorConfig,
    /// Per-execution locks keyed by execution ID.
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    /// Cancellation tokens of executions running in this process.
    running: DashMap<Uuid, CancellationToken>,
}

impl<R: WorkflowRepository + 'static> Orchestrator<R> {
    pub fn new(
        repo: Arc<R>,
        executor: Arc<dyn StepExecutor>,
        event_bus: EventBus,
        config: OrchestratorConfig,
    ) -> Self {
        let recorder = EventRecorder::new(Arc::clone(&repo), event_bus);
        let runner = StepRunner::new(
            Arc::clone(&repo),
            recorder.clone(),
            executor,
            config.default_step_timeout_secs.max(1),
        );

        Self {
            checkpoints: CheckpointManager::new(Arc::clone(&repo)),
            repo,
            recorder,
            runner: Arc::new(runner),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_steps.max(1))),
            config,
            locks: DashMap::new(),
            running: DashMap::new(),
        }
    }

    /// Build an orchestrator with an event bus sized from `config`.
    pub fn from_config(
        repo: Arc<R>,
        executor: Arc<dyn StepExecutor>,
        config: OrchestratorConfig,
    ) -> Self {
        let bus = EventBus::new(config.event_bus_capacity);
        Self::new(repo, executor, bus, config)
    }

    pub fn event_bus(&self) -> &EventBus {
        self.recorder.bus()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Whether the execution is currently running in this process.
    pub fn is_running(&self, execution_id: Uuid) -> bool {
        self.running.contains_key(&execution_id)
    }

    // -----------------------------------------------------------------------
    // Public operations
    // -----------------------------------------------------------------------

    /// Execute a workflow from the beginning.
    ///
    /// An invalid definition fails before anything is persisted. Once the
    /// execution exists, any failure leaves it `failed` with its error.
    pub async fn execute_workflow(
        &self,
        def: &WorkflowDefinition,
        options: ExecuteOptions,
    ) -> Result<WorkflowResult, OrchestratorError> {
        validate(def)?;

        let stored = self.repo.create_workflow(def).await?;
        let execution = self
            .repo
            .create_execution(
                &stored.id,
                &options.context,
                &options.triggered_by,
                options.priority,
                options.parent_execution_id.as_ref(),
            )
            .await?;
        let execution_id = execution.id;

        let token = CancellationToken::new();
        let _registration = Registration::new(&self.running, execution_id, token.clone());

        tracing::info!(
            workflow = def.name.as_str(),
            execution_id = %execution_id,
            triggered_by = options.triggered_by.as_str(),
            steps = def.steps.len(),
            "starting workflow execution"
        );

        let outcome = self
            .start(def, execution_id, stored.id, options.context, token)
            .await;

        self.settle(execution_id, outcome).await
    }

    /// Resume an execution from a checkpoint.
    ///
    /// Steps recorded as completed in the checkpoint are not re-run; their
    /// results come from the checkpoint's context snapshot.
    pub async fn resume_workflow(
        &self,
        checkpoint_id: Uuid,
    ) -> Result<WorkflowResult, OrchestratorError> {
        let checkpoint = self.checkpoints.restore(checkpoint_id).await?;
        self.resume_from(checkpoint).await
    }

    /// Resume an execution from its newest checkpoint.
    pub async fn resume_latest(
        &self,
        execution_id: Uuid,
    ) -> Result<WorkflowResult, OrchestratorError> {
        let checkpoint = self
            .checkpoints
            .latest(execution_id)
            .await?
            .ok_or(OrchestratorError::CheckpointNotFound(execution_id))?;
        self.resume_from(checkpoint).await
    }

    /// Pause an execution. In-flight steps are interrupted and the current
    /// level is not checkpointed.
    pub async fn pause_workflow(&self, execution_id: Uuid) -> Result<(), OrchestratorError> {
        self.halt(
            execution_id,
            WorkflowState::Paused,
            EventType::WorkflowPaused,
            "pause",
        )
        .await
    }

    /// Cancel an execution. Cancelled executions cannot be resumed.
    pub async fn cancel_workflow(&self, execution_id: Uuid) -> Result<(), OrchestratorError> {
        self.halt(
            execution_id,
            WorkflowState::Cancelled,
            EventType::WorkflowCancelled,
            "cancel",
        )
        .await
    }

    /// Aggregate an execution's state and the latest attempt of each step.
    pub async fn get_execution_status(
        &self,
        execution_id: Uuid,
    ) -> Result<ExecutionSummary, OrchestratorError> {
        let execution = self.load_execution(execution_id).await?;
        let attempts = self.repo.list_step_executions(&execution_id).await?;

        let mut latest: HashMap<&str, StepState> = HashMap::new();
        for attempt in &attempts {
            latest.insert(attempt.step_key.as_str(), attempt.state);
        }
        let count = |state: StepState| latest.values().filter(|s| **s == state).count();

        Ok(ExecutionSummary {
            execution_id,
            workflow_id: execution.workflow_id,
            state: execution.state,
            steps_completed: count(StepState::Completed),
            steps_failed: count(StepState::Failed),
            steps_running: count(StepState::Running),
            steps_total: execution.definition.steps.len(),
            resume_count: execution.resume_count,
            started_at: execution.started_at,
            completed_at: execution.completed_at,
            duration_ms: execution.duration_ms,
            error: execution.error,
        })
    }

    /// Executions persisted as `executing` that are not running in this
    /// process, i.e. runs interrupted by a crash or restart.
    pub async fn interrupted_executions(
        &self,
    ) -> Result<Vec<WorkflowExecution>, OrchestratorError> {
        let executing = self
            .repo
            .list_executions_by_state(WorkflowState::Executing)
            .await?;
        Ok(executing
            .into_iter()
            .filter(|e| !self.running.contains_key(&e.id))
            .collect())
    }

    // -----------------------------------------------------------------------
    // Lifecycle internals
    // -----------------------------------------------------------------------

    fn lock_for(&self, execution_id: Uuid) -> Arc<Mutex<()>> {
        self.locks.entry(execution_id).or_default().value().clone()
    }

    async fn load_execution(
        &self,
        execution_id: Uuid,
    ) -> Result<WorkflowExecution, OrchestratorError> {
        self.repo
            .get_execution(&execution_id)
            .await?
            .ok_or(OrchestratorError::ExecutionNotFound(execution_id))
    }

    /// The persisted state if it is `paused` or `cancelled`.
    async fn halted_state(
        &self,
        execution_id: Uuid,
    ) -> Result<Option<WorkflowState>, OrchestratorError> {
        let execution = self.load_execution(execution_id).await?;
        Ok(matches!(execution.state, WorkflowState::Paused | WorkflowState::Cancelled)
            .then_some(execution.state))
    }

    async fn start(
        &self,
        def: &WorkflowDefinition,
        execution_id: Uuid,
        workflow_id: Uuid,
        context: Context,
        token: CancellationToken,
    ) -> Result<WorkflowResult, OrchestratorError> {
        let graph = build_dependency_graph(def)?;
        let mut run = Run {
            execution_id,
            def,
            graph,
            context,
            step_results: Context::new(),
            completed: HashSet::new(),
            failed_steps: Vec::new(),
            token,
        };
        if let Some(state) = self.begin(&run, workflow_id).await? {
            return self.result(&run, state).await;
        }
        self.run_levels(&mut run).await
    }

    /// Write the initial checkpoint and move the execution to `executing`.
    ///
    /// A pause or cancel that landed after the execution was created wins:
    /// the state is left alone and returned. A paused execution keeps the
    /// initial checkpoint so it can be resumed.
    async fn begin(
        &self,
        run: &Run<'_>,
        workflow_id: Uuid,
    ) -> Result<Option<WorkflowState>, OrchestratorError> {
        let lock = self.lock_for(run.execution_id);
        let _guard = lock.lock().await;

        if let Some(state) = self.halted_state(run.execution_id).await? {
            if state == WorkflowState::Paused {
                self.checkpoints
                    .create(
                        run.execution_id,
                        run.context.clone(),
                        Vec::new(),
                        run.graph.topological_order.clone(),
                    )
                    .await?;
            }
            tracing::info!(
                execution_id = %run.execution_id,
                state = state.as_str(),
                "execution halted before it started"
            );
            return Ok(Some(state));
        }

        self.recorder
            .record(
                run.execution_id,
                EventType::WorkflowStarted,
                json!({
                    "workflow": run.def.name,
                    "workflow_id": workflow_id,
                    "steps": run.def.steps.len(),
                    "levels": run.graph.levels.len(),
                }),
            )
            .await?;

        self.checkpoints
            .create(
                run.execution_id,
                run.context.clone(),
                Vec::new(),
                run.graph.topological_order.clone(),
            )
            .await?;

        self.repo
            .update_execution_state(&run.execution_id, WorkflowState::Executing, None)
            .await?;
        Ok(None)
    }

    async fn resume_from(
        &self,
        checkpoint: Checkpoint,
    ) -> Result<WorkflowResult, OrchestratorError> {
        let execution_id = checkpoint.execution_id;
        let def = self.load_execution(execution_id).await?.definition;
        let graph = build_dependency_graph(&def)?;

        let token = CancellationToken::new();
        let _registration = {
            let lock = self.lock_for(execution_id);
            let _guard = lock.lock().await;

            let execution = self.load_execution(execution_id).await?;
            if matches!(
                execution.state,
                WorkflowState::Completed | WorkflowState::Cancelled
            ) || self.running.contains_key(&execution_id)
            {
                return Err(OrchestratorError::InvalidState {
                    execution_id,
                    state: execution.state,
                    operation: "resume",
                });
            }

            let registration = Registration::new(&self.running, execution_id, token.clone());
            self.repo
                .update_execution_state(&execution_id, WorkflowState::Executing, None)
                .await?;
            let resume_count = self.repo.increment_resume_count(&execution_id).await?;
            self.recorder
                .record(
                    execution_id,
                    EventType::WorkflowResumed,
                    json!({
                        "checkpoint_id": checkpoint.id,
                        "previous_state": execution.state,
                        "resume_count": resume_count,
                        "completed_steps": checkpoint.completed_steps,
                    }),
                )
                .await?;

            tracing::info!(
                workflow = def.name.as_str(),
                execution_id = %execution_id,
                checkpoint_id = %checkpoint.id,
                resume_count,
                pending = checkpoint.pending_steps.len(),
                "resuming workflow execution"
            );
            registration
        };

        let step_results: Context = checkpoint
            .completed_steps
            .iter()
            .filter_map(|key| {
                checkpoint
                    .context_snapshot
                    .get(key)
                    .map(|value| (key.clone(), value.clone()))
            })
            .collect();

        let mut run = Run {
            execution_id,
            def: &def,
            graph,
            completed: checkpoint.completed_steps.into_iter().collect(),
            context: checkpoint.context_snapshot,
            step_results,
            failed_steps: Vec::new(),
            token,
        };
        let outcome = self.run_levels(&mut run).await;

        self.settle(execution_id, outcome).await
    }

    async fn halt(
        &self,
        execution_id: Uuid,
        target: WorkflowState,
        event: EventType,
        operation: &'static str,
    ) -> Result<(), OrchestratorError> {
        let lock = self.lock_for(execution_id);
        let _guard = lock.lock().await;

        let execution = self.load_execution(execution_id).await?;
        if execution.state.is_terminal() {
            return Err(OrchestratorError::InvalidState {
                execution_id,
                state: execution.state,
                operation,
            });
        }

        self.repo
            .update_execution_state(&execution_id, target, None)
            .await?;
        self.recorder
            .record(
                execution_id,
                event,
                json!({ "previous_state": execution.state }),
            )
            .await?;

        let token = self.running.get(&execution_id).map(|t| t.value().clone());
        if let Some(token) = token {
            token.cancel();
        }

        tracing::info!(
            execution_id = %execution_id,
            from = execution.state.as_str(),
            to = target.as_str(),
            "workflow execution halted"
        );
        Ok(())
    }

    /// Pass a run outcome through, marking the execution failed on error.
    async fn settle(
        &self,
        execution_id: Uuid,
        outcome: Result<WorkflowResult, OrchestratorError>,
    ) -> Result<WorkflowResult, OrchestratorError> {
        match outcome {
            Ok(result) => Ok(result),
            Err(err) => {
                self.mark_failed(execution_id, &err).await;
                Err(err)
            }
        }
    }

    async fn mark_failed(&self, execution_id: Uuid, err: &OrchestratorError) {
        let lock = self.lock_for(execution_id);
        let _guard = lock.lock().await;

        match self.repo.get_execution(&execution_id).await {
            Ok(Some(execution))
                if matches!(
                    execution.state,
                    WorkflowState::Paused | WorkflowState::Cancelled | WorkflowState::Completed
                ) =>
            {
                return;
            }
            Err(e) => {
                tracing::warn!(
                    execution_id = %execution_id,
                    error = %e,
                    "failed to load execution"
                );
            }
            _ => {}
        }

        let message = err.to_string();
        if let Err(e) = self
            .repo
            .update_execution_state(&execution_id, WorkflowState::Failed, Some(&message))
            .await
        {
            tracing::warn!(
                execution_id = %execution_id,
                error = %e,
                "failed to mark execution failed"
            );
        }

        let mut data = json!({ "error": message });
        if let OrchestratorError::StepFailed { step_key, .. } = err {
            data["step_key"] = json!(step_key);
        }
        if let Err(e) = self
            .recorder
            .record(execution_id, EventType::WorkflowFailed, data)
            .await
        {
            tracing::warn!(
                execution_id = %execution_id,
                error = %e,
                "failed to log workflow failure"
            );
        }

        tracing::error!(
            execution_id = %execution_id,
            error = %message,
            "workflow execution failed"
        );
    }

    // -----------------------------------------------------------------------
    // Level loop
    // -----------------------------------------------------------------------

    async fn run_levels(&self, run: &mut Run<'_>) -> Result<WorkflowResult, OrchestratorError> {
        let lock = self.lock_for(run.execution_id);
        let levels = run.graph.levels.clone();

        for (index, level) in levels.iter().enumerate() {
            let to_run: Vec<StepDefinition> = level
                .iter()
                .filter(|key| !run.completed.contains(*key))
                .filter_map(|key| run.def.step(key))
                .cloned()
                .collect();
            if to_run.is_empty() {
                continue;
            }

            {
                let _guard = lock.lock().await;
                if let Some(state) = self.halted_state(run.execution_id).await? {
                    return self.result(run, state).await;
                }
            }

            tracing::debug!(
                execution_id = %run.execution_id,
                level = index,
                steps = ?to_run.iter().map(|s| s.key.as_str()).collect::<Vec<_>>(),
                "dispatching level"
            );
            let outcomes = self.run_level(run, &to_run).await?;

            let _guard = lock.lock().await;
            if let Some(state) = self.halted_state(run.execution_id).await? {
                tracing::info!(
                    execution_id = %run.execution_id,
                    level = index,
                    state = state.as_str(),
                    "execution halted during level, level not checkpointed"
                );
                return self.result(run, state).await;
            }

            let mut fatal: Option<StepExecutionError> = None;
            for (step, outcome) in to_run.iter().zip(outcomes) {
                match outcome {
                    Ok(value) => {
                        run.step_results.insert(step.key.clone(), value);
                        run.completed.insert(step.key.clone());
                    }
                    Err(err) if step.optional => {
                        tracing::warn!(
                            execution_id = %run.execution_id,
                            step = step.key.as_str(),
                            error = %err.source,
                            "optional step failed, continuing"
                        );
                        run.failed_steps.push(step.key.clone());
                    }
                    Err(err) => {
                        if fatal.is_none() {
                            fatal = Some(err);
                        }
                    }
                }
            }

            if let Some(err) = fatal {
                return Err(OrchestratorError::StepFailed {
                    step_key: err.step_key,
                    error: err.source.to_string(),
                });
            }

            self.write_checkpoint(run).await?;
        }

        self.complete(run).await
    }

    /// Run one level's steps concurrently and wait for all of them.
    ///
    /// Outcomes are returned in the order of `steps`. A panicked task is
    /// reported as a failure of its step.
    async fn run_level(
        &self,
        run: &Run<'_>,
        steps: &[StepDefinition],
    ) -> Result<Vec<Result<Value, StepExecutionError>>, OrchestratorError> {
        let context = Arc::new(run.context.clone());
        let step_results = Arc::new(run.step_results.clone());
        let execution_id = run.execution_id;

        let mut tasks = JoinSet::new();
        let mut task_keys = HashMap::with_capacity(steps.len());

        for step in steps {
            let runner = Arc::clone(&self.runner);
            let semaphore = Arc::clone(&self.semaphore);
            let context = Arc::clone(&context);
            let step_results = Arc::clone(&step_results);
            let token = run.token.clone();
            let step = step.clone();
            let key = step.key.clone();

            let handle = tasks.spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        return Err(StepExecutionError::new(&step.key, StepError::Interrupted));
                    }
                    permit = semaphore.acquire_owned() => permit.map_err(|_| {
                        StepExecutionError::new(
                            &step.key,
                            StepError::ExecutionFailed("step semaphore closed".to_string()),
                        )
                    })?,
                };
                runner
                    .execute_step(execution_id, &step, &context, &step_results, &token)
                    .await
            });
            task_keys.insert(handle.id(), key);
        }

        let mut outcomes: HashMap<String, Result<Value, StepExecutionError>> =
            HashMap::with_capacity(steps.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, outcome)) => {
                    if let Some(key) = task_keys.remove(&id) {
                        outcomes.insert(key, outcome);
                    }
                }
                Err(join_error) => {
                    let key = task_keys
                        .remove(&join_error.id())
                        .ok_or_else(|| OrchestratorError::Task(join_error.to_string()))?;
                    tracing::error!(
                        execution_id = %execution_id,
                        step = key.as_str(),
                        error = %join_error,
                        "step task panicked"
                    );
                    let failure = StepExecutionError::new(
                        &key,
                        StepError::ExecutionFailed(format!("step task panicked: {join_error}")),
                    );
                    outcomes.insert(key, Err(failure));
                }
            }
        }

        steps
            .iter()
            .map(|step| {
                outcomes.remove(&step.key).ok_or_else(|| {
                    OrchestratorError::Task(format!("no outcome for step '{}'", step.key))
                })
            })
            .collect()
    }

    /// Persist the merged context and a checkpoint. Caller holds the lock.
    async fn write_checkpoint(&self, run: &Run<'_>) -> Result<(), OrchestratorError> {
        let completed: Vec<String> = run
            .graph
            .topological_order
            .iter()
            .filter(|key| run.completed.contains(*key))
            .cloned()
            .collect();
        let pending = pending_steps(&run.graph.topological_order, &completed);
        let snapshot = merge_context(&run.context, &run.step_results);

        self.repo
            .update_execution_context(&run.execution_id, &snapshot)
            .await?;
        self.checkpoints
            .create(run.execution_id, snapshot, completed, pending)
            .await?;
        Ok(())
    }

    async fn complete(&self, run: &Run<'_>) -> Result<WorkflowResult, OrchestratorError> {
        let lock = self.lock_for(run.execution_id);
        let _guard = lock.lock().await;

        if let Some(state) = self.halted_state(run.execution_id).await? {
            return self.result(run, state).await;
        }

        let merged = merge_context(&run.context, &run.step_results);
        self.repo
            .update_execution_context(&run.execution_id, &merged)
            .await?;
        self.repo
            .update_execution_state(&run.execution_id, WorkflowState::Completed, None)
            .await?;

        let result = self.result(run, WorkflowState::Completed).await?;
        self.recorder
            .record(
                run.execution_id,
                EventType::WorkflowCompleted,
                json!({
                    "duration_ms": result.duration_ms,
                    "steps_completed": run.completed.len(),
                    "failed_steps": run.failed_steps,
                }),
            )
            .await?;

        tracing::info!(
            workflow = run.def.name.as_str(),
            execution_id = %run.execution_id,
            duration_ms = result.duration_ms,
            failed_optional = run.failed_steps.len(),
            "workflow execution completed"
        );
        Ok(result)
    }

    async fn result(
        &self,
        run: &Run<'_>,
        state: WorkflowState,
    ) -> Result<WorkflowResult, OrchestratorError> {
        let execution = self.load_execution(run.execution_id).await?;
        let duration_ms = execution.duration_ms.unwrap_or_else(|| {
            (Utc::now() - execution.started_at)
                .num_milliseconds()
                .max(0) as u64
        });

        Ok(WorkflowResult {
            execution_id: run.execution_id,
            workflow_id: execution.workflow_id,
            name: run.def.name.clone(),
            state,
            context: merge_context(&run.context, &run.step_results),
            step_results: run.step_results.clone(),
            failed_steps: run.failed_steps.clone(),
            started_at: execution.started_at,
            completed_at: execution.completed_at,
            duration_ms,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
