//! Level-boundary checkpoints.
//!
//! Wraps `WorkflowRepository` with the checkpoint contract the orchestrator
//! relies on: a checkpoint is written only after a whole level has settled,
//! records the merged context plus the completed and pending step keys, and
//! is never modified afterwards.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use strata_types::error::RepositoryError;
use strata_types::workflow::{Checkpoint, Context};
use uuid::Uuid;

use crate::repository::workflow::WorkflowRepository;

// ---------------------------------------------------------------------------
// CheckpointManager
// ---------------------------------------------------------------------------

/// Creates and restores execution checkpoints.
///
/// Generic over `R: WorkflowRepository` so it works with any storage backend.
pub struct CheckpointManager<R: WorkflowRepository> {
    repo: Arc<R>,
}

impl<R: WorkflowRepository> CheckpointManager<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Persist a new checkpoint and return it.
    pub async fn create(
        &self,
        execution_id: Uuid,
        context_snapshot: Context,
        completed_steps: Vec<String>,
        pending_steps: Vec<String>,
    ) -> Result<Checkpoint, CheckpointError> {
        let checkpoint = Checkpoint {
            id: Uuid::now_v7(),
            execution_id,
            context_snapshot,
            completed_steps,
            pending_steps,
            created_at: Utc::now(),
        };

        self.repo.create_checkpoint(&checkpoint).await?;

        tracing::debug!(
            execution_id = %execution_id,
            checkpoint_id = %checkpoint.id,
            completed = checkpoint.completed_steps.len(),
            pending = checkpoint.pending_steps.len(),
            "checkpoint written"
        );

        Ok(checkpoint)
    }

    /// Load a checkpoint by ID.
    pub async fn restore(&self, checkpoint_id: Uuid) -> Result<Checkpoint, CheckpointError> {
        self.repo
            .restore_checkpoint(&checkpoint_id)
            .await?
            .ok_or(CheckpointError::NotFound(checkpoint_id))
    }

    /// Newest checkpoint of an execution.
    pub async fn latest(&self, execution_id: Uuid) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.repo.latest_checkpoint(&execution_id).await?)
    }
}

impl<R: WorkflowRepository> Clone for CheckpointManager<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
        }
    }
}

/// Topological order minus the completed steps, order preserved.
pub fn pending_steps(topological_order: &[String], completed: &[String]) -> Vec<String> {
    let done: HashSet<&str> = completed.iter().map(String::as_str).collect();
    topological_order
        .iter()
        .filter(|key| !done.contains(key.as_str()))
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Underlying repository operation failed.
    #[error("checkpoint repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// No checkpoint with this ID.
    #[error("checkpoint not found: {0}")]
    NotFound(Uuid),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::InMemoryWorkflowRepository;
    use serde_json::json;

    fn keys(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn pending_preserves_topological_order() {
        let order = keys(&["a", "b", "c", "d"]);
        assert_eq!(pending_steps(&order, &keys(&["c", "a"])), keys(&["b", "d"]));
        assert_eq!(pending_steps(&order, &[]), order);
        assert!(pending_steps(&order, &order).is_empty());
    }

    #[tokio::test]
    async fn create_then_restore() {
        let repo = Arc::new(InMemoryWorkflowRepository::new());
        let manager = CheckpointManager::new(Arc::clone(&repo));
        let execution_id = Uuid::now_v7();

        let mut snapshot = Context::new();
        snapshot.insert("a".to_string(), json!({"ok": true}));

        let created = manager
            .create(execution_id, snapshot, keys(&["a"]), keys(&["b"]))
            .await
            .unwrap();

        let restored = manager.restore(created.id).await.unwrap();
        assert_eq!(restored.execution_id, execution_id);
        assert_eq!(restored.completed_steps, keys(&["a"]));
        assert_eq!(restored.pending_steps, keys(&["b"]));
        assert_eq!(restored.context_snapshot["a"]["ok"], true);
    }

    #[tokio::test]
    async fn latest_returns_newest() {
        let repo = Arc::new(InMemoryWorkflowRepository::new());
        let manager = CheckpointManager::new(repo);
        let execution_id = Uuid::now_v7();

        assert!(manager.latest(execution_id).await.unwrap().is_none());

        manager
            .create(execution_id, Context::new(), vec![], keys(&["a", "b"]))
            .await
            .unwrap();
        let second = manager
            .create(execution_id, Context::new(), keys(&["a"]), keys(&["b"]))
            .await
            .unwrap();

        let latest = manager.latest(execution_id).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
    }

    #[tokio::test]
    async fn restore_unknown_is_not_found() {
        let manager = CheckpointManager::new(Arc::new(InMemoryWorkflowRepository::new()));
        let missing = Uuid::now_v7();
        let err = manager.restore(missing).await.unwrap_err();
        assert!(matches!(err, CheckpointError::NotFound(id) if id == missing));
    }

    #[test]
    fn checkpoint_error_display() {
        let err = CheckpointError::Repository(RepositoryError::Query("disk full".to_string()));
        assert!(err.to_string().contains("disk full"));

        let err = CheckpointError::NotFound(Uuid::nil());
        assert!(err.to_string().contains("not found"));
    }
}
