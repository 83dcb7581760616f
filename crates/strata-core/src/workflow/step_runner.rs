//! Single-step execution.
//!
//! `StepRunner` owns the bookkeeping around one step attempt: it records the
//! `StepExecution`, renders the instruction, hands it to the external
//! `StepExecutor`, and turns the outcome into a state transition plus an
//! event. It knows nothing about levels, optional steps or workflow state;
//! those belong to the orchestrator.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use strata_types::error::RepositoryError;
use strata_types::event::EventType;
use strata_types::workflow::{Context, StepDefinition, StepState};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::event::recorder::EventRecorder;
use crate::repository::workflow::WorkflowRepository;

use super::template::{merge_context, render_instruction, RenderError};

// ---------------------------------------------------------------------------
// StepExecutor
// ---------------------------------------------------------------------------

/// Identity of the step being executed, passed to the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepMeta {
    pub execution_id: Uuid,
    /// Step key within the workflow.
    pub key: String,
    /// Agent the step is addressed to.
    pub agent: String,
}

/// The external collaborator that actually performs a step.
///
/// Object-safe (boxed future) so the orchestrator can hold it as
/// `Arc<dyn StepExecutor>`. Implementations should watch `cancel` and return
/// early once it fires; the runner stops waiting at that point regardless.
pub trait StepExecutor: Send + Sync {
    /// Execute a rendered instruction and return the step result.
    fn execute<'a>(
        &'a self,
        instruction: &'a str,
        meta: &'a StepMeta,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Value, StepError>> + Send + 'a>>;
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during step execution.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// The executor reported a failure.
    #[error("step execution failed: {0}")]
    ExecutionFailed(String),

    /// The instruction template could not be rendered.
    #[error("template error: {0}")]
    Render(#[from] RenderError),

    /// The executor did not finish within the step timeout.
    #[error("step timed out after {0}s")]
    Timeout(u64),

    /// The execution was paused or cancelled while the step was in flight.
    #[error("step interrupted by pause or cancel")]
    Interrupted,

    /// Recording the step attempt failed.
    #[error("step bookkeeping failed: {0}")]
    Repository(#[from] RepositoryError),
}

impl StepError {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, StepError::Interrupted)
    }
}

/// A step attempt failed.
#[derive(Debug, thiserror::Error)]
#[error("step '{step_key}' failed: {source}")]
pub struct StepExecutionError {
    pub step_key: String,
    pub source: StepError,
}

impl StepExecutionError {
    pub fn new(step_key: impl Into<String>, source: StepError) -> Self {
        Self {
            step_key: step_key.into(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// StepRunner
// ---------------------------------------------------------------------------

/// Runs individual steps against the configured executor.
pub struct StepRunner<R: WorkflowRepository> {
    repo: Arc<R>,
    recorder: EventRecorder<R>,
    executor: Arc<dyn StepExecutor>,
    default_timeout_secs: u64,
}

impl<R: WorkflowRepository> StepRunner<R> {
    pub fn new(
        repo: Arc<R>,
        recorder: EventRecorder<R>,
        executor: Arc<dyn StepExecutor>,
        default_timeout_secs: u64,
    ) -> Self {
        Self {
            repo,
            recorder,
            executor,
            default_timeout_secs,
        }
    }

    /// Execute one attempt of `step`.
    ///
    /// The instruction is rendered against `context` merged with
    /// `step_results`. The executor call races `cancel` and the step timeout;
    /// a failure observed after `cancel` fired is reported as
    /// `StepError::Interrupted`.
    pub async fn execute_step(
        &self,
        execution_id: Uuid,
        step: &StepDefinition,
        context: &Context,
        step_results: &Context,
        cancel: &CancellationToken,
    ) -> Result<Value, StepExecutionError> {
        let started = Instant::now();

        let record = self
            .repo
            .create_step_execution(&execution_id, &step.key, StepState::Pending, &step.agent)
            .await
            .map_err(|e| StepExecutionError::new(&step.key, e.into()))?;

        let outcome = self
            .attempt(execution_id, record.id, step, context, step_results, cancel)
            .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(value) => {
                self.repo
                    .update_step_execution_state(
                        &record.id,
                        StepState::Completed,
                        Some(&value),
                        None,
                    )
                    .await
                    .map_err(|e| StepExecutionError::new(&step.key, e.into()))?;
                self.recorder
                    .record(
                        execution_id,
                        EventType::StepCompleted,
                        json!({
                            "step_key": step.key,
                            "agent": step.agent,
                            "step_execution_id": record.id,
                            "duration_ms": duration_ms,
                        }),
                    )
                    .await
                    .map_err(|e| StepExecutionError::new(&step.key, e.into()))?;

                tracing::debug!(
                    execution_id = %execution_id,
                    step = step.key.as_str(),
                    duration_ms,
                    "step completed"
                );
                Ok(value)
            }
            Err(source) => {
                let source = if cancel.is_cancelled() {
                    StepError::Interrupted
                } else {
                    source
                };
                self.record_failure(execution_id, record.id, step, &source, duration_ms)
                    .await;
                Err(StepExecutionError::new(&step.key, source))
            }
        }
    }

    async fn attempt(
        &self,
        execution_id: Uuid,
        step_execution_id: Uuid,
        step: &StepDefinition,
        context: &Context,
        step_results: &Context,
        cancel: &CancellationToken,
    ) -> Result<Value, StepError> {
        self.repo
            .update_step_execution_state(&step_execution_id, StepState::Running, None, None)
            .await?;
        self.recorder
            .record(
                execution_id,
                EventType::StepStarted,
                json!({
                    "step_key": step.key,
                    "agent": step.agent,
                    "step_execution_id": step_execution_id,
                }),
            )
            .await?;

        let merged = merge_context(context, step_results);
        let instruction = render_instruction(&step.instruction, &merged)?;

        let meta = StepMeta {
            execution_id,
            key: step.key.clone(),
            agent: step.agent.clone(),
        };
        let timeout_secs = step.timeout_secs.unwrap_or(self.default_timeout_secs);
        let child = cancel.child_token();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StepError::Interrupted),
            outcome = tokio::time::timeout(
                Duration::from_secs(timeout_secs),
                self.executor.execute(&instruction, &meta, child.clone()),
            ) => match outcome {
                Ok(result) => result,
                Err(_) => {
                    child.cancel();
                    Err(StepError::Timeout(timeout_secs))
                }
            },
        }
    }

    /// Mark the attempt failed and log `step_failed`. Best effort: the
    /// step's own error is what the caller needs to see.
    async fn record_failure(
        &self,
        execution_id: Uuid,
        step_execution_id: Uuid,
        step: &StepDefinition,
        error: &StepError,
        duration_ms: u64,
    ) {
        let message = error.to_string();

        if let Err(e) = self
            .repo
            .update_step_execution_state(
                &step_execution_id,
                StepState::Failed,
                None,
                Some(&message),
            )
            .await
        {
            tracing::warn!(step = step.key.as_str(), error = %e, "failed to mark step failed");
        }

        if let Err(e) = self
            .recorder
            .record(
                execution_id,
                EventType::StepFailed,
                json!({
                    "step_key": step.key,
                    "agent": step.agent,
                    "step_execution_id": step_execution_id,
                    "error": message,
                    "interrupted": error.is_interrupted(),
                    "duration_ms": duration_ms,
                }),
            )
            .await
        {
            tracing::warn!(step = step.key.as_str(), error = %e, "failed to log step failure");
        }

        if error.is_interrupted() {
            tracing::debug!(
                execution_id = %execution_id,
                step = step.key.as_str(),
                "step interrupted"
            );
        } else {
            tracing::debug!(
                execution_id = %execution_id,
                step = step.key.as_str(),
                error = %message,
                "step failed"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::bus::EventBus;
    use crate::repository::memory::InMemoryWorkflowRepository;
    use crate::workflow::test_support::{Behavior, ScriptedExecutor};
    use strata_types::workflow::WorkflowDefinition;

    struct Harness {
        repo: Arc<InMemoryWorkflowRepository>,
        executor: Arc<ScriptedExecutor>,
        runner: StepRunner<InMemoryWorkflowRepository>,
        execution_id: Uuid,
    }

    async fn harness(default_timeout_secs: u64) -> Harness {
        let repo = Arc::new(InMemoryWorkflowRepository::new());
        let def = WorkflowDefinition {
            name: "runner-test".to_string(),
            description: None,
            steps: vec![],
        };
        let stored = repo.create_workflow(&def).await.unwrap();
        let execution = repo
            .create_execution(&stored.id, &Context::new(), "test", 0, None)
            .await
            .unwrap();

        let executor = Arc::new(ScriptedExecutor::new());
        let recorder = EventRecorder::new(Arc::clone(&repo), EventBus::new(64));
        let runner = StepRunner::new(
            Arc::clone(&repo),
            recorder,
            executor.clone() as Arc<dyn StepExecutor>,
            default_timeout_secs,
        );

        Harness {
            repo,
            executor,
            runner,
            execution_id: execution.id,
        }
    }

    fn ctx(value: Value) -> Context {
        match value {
            Value::Object(map) => map,
            _ => panic!("context must be an object"),
        }
    }

    #[tokio::test]
    async fn success_renders_and_records() {
        let h = harness(30).await;
        let step = StepDefinition::new(
            "summarize",
            "writer",
            "Summarize {{ topic }} using {{ fetch.step }}",
        );

        let value = h
            .runner
            .execute_step(
                h.execution_id,
                &step,
                &ctx(json!({"topic": "rust"})),
                &ctx(json!({"fetch": {"step": "fetch"}})),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(value["step"], "summarize");
        assert_eq!(
            h.executor.instruction_for("summarize").as_deref(),
            Some("Summarize rust using fetch")
        );

        let steps = h.repo.list_step_executions(&h.execution_id).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].state, StepState::Completed);
        assert_eq!(steps[0].agent, "writer");
        assert!(steps[0].started_at.is_some());
        assert!(steps[0].completed_at.is_some());

        let events = h.repo.list_events(&h.execution_id).await.unwrap();
        let kinds: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(kinds, vec![EventType::StepStarted, EventType::StepCompleted]);
        assert!(events[1].event_data.get("duration_ms").is_some());
    }

    #[tokio::test]
    async fn render_failure_fails_step_without_calling_executor() {
        let h = harness(30).await;
        let step = StepDefinition::new("notify", "mailer", "Send {{ missing }}");

        let err = h
            .runner
            .execute_step(
                h.execution_id,
                &step,
                &Context::new(),
                &Context::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.step_key, "notify");
        assert!(matches!(
            err.source,
            StepError::Render(RenderError::MissingKey(ref k)) if k == "missing"
        ));
        assert_eq!(h.executor.call_count("notify"), 0);

        let steps = h.repo.list_step_executions(&h.execution_id).await.unwrap();
        assert_eq!(steps[0].state, StepState::Failed);
        assert!(steps[0].error.as_deref().unwrap().contains("missing"));
    }

    #[tokio::test]
    async fn executor_failure_is_recorded() {
        let h = harness(30).await;
        h.executor.set("fetch", Behavior::Fail("upstream 502".to_string()));
        let step = StepDefinition::new("fetch", "http", "GET");

        let err = h
            .runner
            .execute_step(
                h.execution_id,
                &step,
                &Context::new(),
                &Context::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(err.to_string().contains("upstream 502"));
        let events = h.repo.list_events(&h.execution_id).await.unwrap();
        let failed = events.last().unwrap();
        assert_eq!(failed.event_type, EventType::StepFailed);
        assert_eq!(failed.event_data["interrupted"], false);
    }

    #[tokio::test]
    async fn step_timeout_uses_step_override() {
        let h = harness(300).await;
        h.executor.set("slow", Behavior::Sleep(Duration::from_secs(30)));
        let mut step = StepDefinition::new("slow", "agent", "wait");
        step.timeout_secs = Some(1);

        let err = h
            .runner
            .execute_step(
                h.execution_id,
                &step,
                &Context::new(),
                &Context::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err.source, StepError::Timeout(1)));
    }

    #[tokio::test]
    async fn cancellation_interrupts_in_flight_step() {
        let h = harness(300).await;
        let started = h.executor.block("long");
        let step = StepDefinition::new("long", "agent", "run forever");
        let token = CancellationToken::new();

        let trip = token.clone();
        tokio::spawn(async move {
            started.notified().await;
            trip.cancel();
        });

        let err = h
            .runner
            .execute_step(h.execution_id, &step, &Context::new(), &Context::new(), &token)
            .await
            .unwrap_err();

        assert!(err.source.is_interrupted());
        let events = h.repo.list_events(&h.execution_id).await.unwrap();
        assert_eq!(events.last().unwrap().event_data["interrupted"], true);
    }

    #[test]
    fn step_execution_error_display_names_step() {
        let err = StepExecutionError::new("c", StepError::ExecutionFailed("boom".to_string()));
        assert_eq!(err.to_string(), "step 'c' failed: step execution failed: boom");
    }
}
