//! Runtime wiring the orchestrator to SQLite storage.
//!
//! `StrataRuntime` resolves the data directory, loads `config.toml`, opens the
//! database and pins the orchestrator to `SqliteWorkflowRepository`. Embedders
//! supply only the step executor.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use strata_core::workflow::{Orchestrator, OrchestratorError, StepExecutor};
use strata_types::config::OrchestratorConfig;
use strata_types::workflow::WorkflowResult;
use uuid::Uuid;

use crate::config::{default_data_dir, load_config};
use crate::sqlite::pool::DatabasePool;
use crate::sqlite::workflow::SqliteWorkflowRepository;

/// Orchestrator pinned to the SQLite repository.
pub type SqliteOrchestrator = Orchestrator<SqliteWorkflowRepository>;

/// Outcome of resuming one interrupted execution.
#[derive(Debug)]
pub struct Recovery {
    pub execution_id: Uuid,
    pub outcome: Result<WorkflowResult, OrchestratorError>,
}

/// Shared runtime holding the orchestrator and its storage.
#[derive(Clone)]
pub struct StrataRuntime {
    pub orchestrator: Arc<SqliteOrchestrator>,
    pub config: OrchestratorConfig,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
}

impl StrataRuntime {
    /// Initialize in the default data directory (`STRATA_DATA_DIR` or `~/.strata`).
    pub async fn init(executor: Arc<dyn StepExecutor>) -> anyhow::Result<Self> {
        Self::open(default_data_dir(), executor).await
    }

    /// Initialize in `data_dir`: create it, load config, connect to the DB.
    pub async fn open(
        data_dir: impl Into<PathBuf>,
        executor: Arc<dyn StepExecutor>,
    ) -> anyhow::Result<Self> {
        let data_dir = data_dir.into();

        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let config = load_config(&data_dir).await;

        let db_pool = DatabasePool::open_in(&data_dir)
            .await
            .with_context(|| format!("failed to open database in {}", data_dir.display()))?;

        let repo = Arc::new(SqliteWorkflowRepository::new(db_pool.clone()));
        let orchestrator = Orchestrator::from_config(repo, executor, config.clone());

        tracing::info!(
            data_dir = %data_dir.display(),
            max_concurrent_steps = config.max_concurrent_steps,
            "strata runtime ready"
        );

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            config,
            data_dir,
            db_pool,
        })
    }

    /// Resume every execution left `executing` by a previous process.
    ///
    /// Each execution resumes from its newest checkpoint, one at a time. A
    /// failed resume is reported in its `Recovery` and does not stop the rest.
    pub async fn recover_interrupted(&self) -> anyhow::Result<Vec<Recovery>> {
        let interrupted = self
            .orchestrator
            .interrupted_executions()
            .await
            .context("failed to list interrupted executions")?;

        if interrupted.is_empty() {
            return Ok(Vec::new());
        }
        tracing::info!(count = interrupted.len(), "recovering interrupted executions");

        let mut recoveries = Vec::with_capacity(interrupted.len());
        for execution in interrupted {
            let outcome = self.orchestrator.resume_latest(execution.id).await;
            if let Err(ref e) = outcome {
                tracing::warn!(execution_id = %execution.id, error = %e, "recovery failed");
            }
            recoveries.push(Recovery {
                execution_id: execution.id,
                outcome,
            });
        }
        Ok(recoveries)
    }

    /// Close the database pools.
    pub async fn shutdown(&self) {
        self.db_pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;

    use chrono::Utc;
    use serde_json::{json, Value};
    use strata_core::repository::workflow::WorkflowRepository;
    use strata_core::workflow::{StepError, StepMeta};
    use strata_types::workflow::{
        Checkpoint, Context, ExecuteOptions, StepDefinition, WorkflowDefinition, WorkflowState,
    };
    use tokio_util::sync::CancellationToken;

    use super::*;

    struct EchoExecutor;

    impl StepExecutor for EchoExecutor {
        fn execute<'a>(
            &'a self,
            instruction: &'a str,
            meta: &'a StepMeta,
            _cancel: CancellationToken,
        ) -> Pin<Box<dyn Future<Output = Result<Value, StepError>> + Send + 'a>> {
            Box::pin(async move { Ok(json!({"step": meta.key, "instruction": instruction})) })
        }
    }

    fn pipeline() -> WorkflowDefinition {
        WorkflowDefinition {
            name: "ingest".to_string(),
            description: None,
            steps: vec![
                StepDefinition::new("fetch", "fetcher", "fetch {{ source }}"),
                StepDefinition::new("store", "writer", "store {{ fetch.step }}")
                    .depends_on(["fetch"]),
            ],
        }
    }

    #[tokio::test]
    async fn test_open_creates_data_dir_and_database() {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = tmp.path().join("nested").join("strata");

        let runtime = StrataRuntime::open(&data_dir, Arc::new(EchoExecutor))
            .await
            .unwrap();

        assert!(data_dir.join("strata.db").exists());
        assert_eq!(runtime.config, OrchestratorConfig::default());
    }

    #[tokio::test]
    async fn test_open_reads_config_toml() {
        let tmp = tempfile::tempdir().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "max_concurrent_steps = 2\n")
            .await
            .unwrap();

        let runtime = StrataRuntime::open(tmp.path(), Arc::new(EchoExecutor))
            .await
            .unwrap();
        assert_eq!(runtime.config.max_concurrent_steps, 2);
        assert_eq!(runtime.orchestrator.config().max_concurrent_steps, 2);
    }

    #[tokio::test]
    async fn test_execution_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let mut context = Context::new();
        context.insert("source".into(), json!("feed.xml"));

        let execution_id = {
            let runtime = StrataRuntime::open(tmp.path(), Arc::new(EchoExecutor))
                .await
                .unwrap();
            let result = runtime
                .orchestrator
                .execute_workflow(
                    &pipeline(),
                    ExecuteOptions {
                        context,
                        ..ExecuteOptions::default()
                    },
                )
                .await
                .unwrap();
            assert_eq!(result.state, WorkflowState::Completed);
            assert_eq!(result.step_results["store"]["instruction"], "store fetch");
            runtime.shutdown().await;
            result.execution_id
        };

        let reopened = StrataRuntime::open(tmp.path(), Arc::new(EchoExecutor))
            .await
            .unwrap();
        let status = reopened
            .orchestrator
            .get_execution_status(execution_id)
            .await
            .unwrap();
        assert_eq!(status.state, WorkflowState::Completed);
        assert_eq!(status.steps_completed, 2);
        assert_eq!(status.steps_total, 2);
    }

    #[tokio::test]
    async fn test_recover_interrupted_resumes_from_checkpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let runtime = StrataRuntime::open(tmp.path(), Arc::new(EchoExecutor))
            .await
            .unwrap();

        // Leave an execution as a crashed process would: executing, with
        // "fetch" checkpointed and "store" still pending.
        let repo = SqliteWorkflowRepository::new(runtime.db_pool.clone());
        let stored = repo.create_workflow(&pipeline()).await.unwrap();
        let mut context = Context::new();
        context.insert("source".into(), json!("feed.xml"));
        let execution = repo
            .create_execution(&stored.id, &context, "manual", 0, None)
            .await
            .unwrap();
        let mut snapshot = context.clone();
        snapshot.insert("fetch".into(), json!({"step": "fetch-from-checkpoint"}));
        repo.create_checkpoint(&Checkpoint {
            id: Uuid::now_v7(),
            execution_id: execution.id,
            context_snapshot: snapshot,
            completed_steps: vec!["fetch".into()],
            pending_steps: vec!["store".into()],
            created_at: Utc::now(),
        })
        .await
        .unwrap();
        repo.update_execution_state(&execution.id, WorkflowState::Executing, None)
            .await
            .unwrap();

        let recoveries = runtime.recover_interrupted().await.unwrap();
        assert_eq!(recoveries.len(), 1);
        assert_eq!(recoveries[0].execution_id, execution.id);
        let result = recoveries[0].outcome.as_ref().unwrap();
        assert_eq!(result.state, WorkflowState::Completed);
        assert_eq!(
            result.step_results["store"]["instruction"],
            "store fetch-from-checkpoint"
        );

        // Only the pending step ran again.
        let steps = repo.list_step_executions(&execution.id).await.unwrap();
        let keys: Vec<&str> = steps.iter().map(|s| s.step_key.as_str()).collect();
        assert_eq!(keys, vec!["store"]);

        let reloaded = repo.get_execution(&execution.id).await.unwrap().unwrap();
        assert_eq!(reloaded.resume_count, 1);
        assert!(runtime.recover_interrupted().await.unwrap().is_empty());
    }
}
