//! Durable event recording.
//!
//! `EventRecorder` writes each execution event to the repository's event log
//! and then broadcasts the stored record, so live subscribers only ever see
//! events that are already durable.

use std::sync::Arc;

use serde_json::Value;
use strata_types::error::RepositoryError;
use strata_types::event::EventType;
use uuid::Uuid;

use crate::repository::workflow::WorkflowRepository;

use super::bus::EventBus;

/// Persists and publishes execution events.
pub struct EventRecorder<R: WorkflowRepository> {
    repo: Arc<R>,
    bus: EventBus,
}

impl<R: WorkflowRepository> EventRecorder<R> {
    pub fn new(repo: Arc<R>, bus: EventBus) -> Self {
        Self { repo, bus }
    }

    /// The bus events are published on.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Write an event to the log, then publish it.
    pub async fn record(
        &self,
        execution_id: Uuid,
        event_type: EventType,
        event_data: Value,
    ) -> Result<(), RepositoryError> {
        let event = self
            .repo
            .log_event(&execution_id, event_type, &event_data)
            .await?;

        tracing::debug!(
            execution_id = %execution_id,
            event = event_type.as_str(),
            "recorded execution event"
        );

        self.bus.publish(event);
        Ok(())
    }
}

impl<R: WorkflowRepository> Clone for EventRecorder<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            bus: self.bus.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::InMemoryWorkflowRepository;
    use serde_json::json;

    #[tokio::test]
    async fn record_persists_then_publishes() {
        let repo = Arc::new(InMemoryWorkflowRepository::new());
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let recorder = EventRecorder::new(Arc::clone(&repo), bus);

        let execution_id = Uuid::now_v7();
        recorder
            .record(execution_id, EventType::StepStarted, json!({"step_key": "fetch"}))
            .await
            .unwrap();

        let stored = repo.list_events(&execution_id).await.unwrap();
        assert_eq!(stored.len(), 1);

        let published = rx.recv().await.unwrap();
        assert_eq!(published.id, stored[0].id);
        assert_eq!(published.event_data["step_key"], "fetch");
    }
}
