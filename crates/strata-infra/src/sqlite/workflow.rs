//! SQLite workflow repository implementation.
//!
//! Implements `WorkflowRepository` from `strata-core` using sqlx with split
//! read/write pools. Definitions, contexts, results and checkpoint step lists
//! are stored as JSON text. Rows are listed in insertion (rowid) order, which
//! is the order the orchestrator wrote them.

use chrono::{DateTime, Utc};
use sqlx::Row;
use strata_core::repository::workflow::WorkflowRepository;
use strata_types::error::RepositoryError;
use strata_types::event::{EventType, ExecutionEvent};
use strata_types::workflow::{
    Checkpoint, Context, StepExecution, StepState, StoredWorkflow, WorkflowDefinition,
    WorkflowExecution, WorkflowState,
};
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `WorkflowRepository`.
#[derive(Clone)]
pub struct SqliteWorkflowRepository {
    pool: DatabasePool,
}

impl SqliteWorkflowRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct WorkflowRow {
    id: String,
    name: String,
    definition: String,
    created_at: String,
    updated_at: String,
}

impl WorkflowRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            definition: row.try_get("definition")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_stored(self) -> Result<StoredWorkflow, RepositoryError> {
        let definition: WorkflowDefinition = serde_json::from_str(&self.definition)
            .map_err(|e| RepositoryError::Query(format!("invalid workflow definition JSON: {e}")))?;

        Ok(StoredWorkflow {
            id: parse_uuid(&self.id)?,
            name: self.name,
            definition,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct ExecutionRow {
    id: String,
    workflow_id: String,
    definition: String,
    state: String,
    context: String,
    triggered_by: String,
    priority: i64,
    parent_execution_id: Option<String>,
    started_at: String,
    completed_at: Option<String>,
    duration_ms: Option<i64>,
    resume_count: i64,
    error: Option<String>,
}

impl ExecutionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            definition: row.try_get("definition")?,
            state: row.try_get("state")?,
            context: row.try_get("context")?,
            triggered_by: row.try_get("triggered_by")?,
            priority: row.try_get("priority")?,
            parent_execution_id: row.try_get("parent_execution_id")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            duration_ms: row.try_get("duration_ms")?,
            resume_count: row.try_get("resume_count")?,
            error: row.try_get("error")?,
        })
    }

    fn into_execution(self) -> Result<WorkflowExecution, RepositoryError> {
        let state: WorkflowState = parse_enum(&self.state, "execution state")?;
        let definition: WorkflowDefinition = serde_json::from_str(&self.definition)
            .map_err(|e| RepositoryError::Query(format!("invalid execution definition: {e}")))?;
        let context: Context = serde_json::from_str(&self.context)
            .map_err(|e| RepositoryError::Query(format!("invalid context JSON: {e}")))?;

        Ok(WorkflowExecution {
            id: parse_uuid(&self.id)?,
            workflow_id: parse_uuid(&self.workflow_id)?,
            definition,
            state,
            context,
            triggered_by: self.triggered_by,
            priority: self.priority as i32,
            parent_execution_id: self
                .parent_execution_id
                .as_deref()
                .map(parse_uuid)
                .transpose()?,
            started_at: parse_datetime(&self.started_at)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
            duration_ms: self.duration_ms.map(|ms| ms.max(0) as u64),
            resume_count: self.resume_count.max(0) as u32,
            error: self.error,
        })
    }
}

struct StepRow {
    id: String,
    execution_id: String,
    step_key: String,
    agent: String,
    state: String,
    result: Option<String>,
    error: Option<String>,
    started_at: Option<String>,
    completed_at: Option<String>,
}

impl StepRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            execution_id: row.try_get("execution_id")?,
            step_key: row.try_get("step_key")?,
            agent: row.try_get("agent")?,
            state: row.try_get("state")?,
            result: row.try_get("result")?,
            error: row.try_get("error")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_step_execution(self) -> Result<StepExecution, RepositoryError> {
        let state: StepState = parse_enum(&self.state, "step state")?;

        let result = self
            .result
            .as_deref()
            .map(|s| {
                serde_json::from_str(s)
                    .map_err(|e| RepositoryError::Query(format!("invalid step result: {e}")))
            })
            .transpose()?;

        Ok(StepExecution {
            id: parse_uuid(&self.id)?,
            execution_id: parse_uuid(&self.execution_id)?,
            step_key: self.step_key,
            agent: self.agent,
            state,
            result,
            error: self.error,
            started_at: self
                .started_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
        })
    }
}

struct EventRow {
    id: String,
    execution_id: String,
    event_type: String,
    event_data: String,
    created_at: String,
}

impl EventRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            execution_id: row.try_get("execution_id")?,
            event_type: row.try_get("event_type")?,
            event_data: row.try_get("event_data")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_event(self) -> Result<ExecutionEvent, RepositoryError> {
        let event_type: EventType = parse_enum(&self.event_type, "event type")?;
        let event_data = serde_json::from_str(&self.event_data)
            .map_err(|e| RepositoryError::Query(format!("invalid event data: {e}")))?;

        Ok(ExecutionEvent {
            id: parse_uuid(&self.id)?,
            execution_id: parse_uuid(&self.execution_id)?,
            event_type,
            event_data,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

struct CheckpointRow {
    id: String,
    execution_id: String,
    context_snapshot: String,
    completed_steps: String,
    pending_steps: String,
    created_at: String,
}

impl CheckpointRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            execution_id: row.try_get("execution_id")?,
            context_snapshot: row.try_get("context_snapshot")?,
            completed_steps: row.try_get("completed_steps")?,
            pending_steps: row.try_get("pending_steps")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_checkpoint(self) -> Result<Checkpoint, RepositoryError> {
        let context_snapshot: Context = serde_json::from_str(&self.context_snapshot)
            .map_err(|e| RepositoryError::Query(format!("invalid context snapshot: {e}")))?;
        let completed_steps: Vec<String> = serde_json::from_str(&self.completed_steps)
            .map_err(|e| RepositoryError::Query(format!("invalid completed_steps: {e}")))?;
        let pending_steps: Vec<String> = serde_json::from_str(&self.pending_steps)
            .map_err(|e| RepositoryError::Query(format!("invalid pending_steps: {e}")))?;

        Ok(Checkpoint {
            id: parse_uuid(&self.id)?,
            execution_id: parse_uuid(&self.execution_id)?,
            context_snapshot,
            completed_steps,
            pending_steps,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const EXECUTION_COLUMNS: &str = "id, workflow_id, definition, state, context, triggered_by, \
     priority, parent_execution_id, started_at, completed_at, duration_ms, resume_count, error";

const STEP_COLUMNS: &str =
    "id, execution_id, step_key, agent, state, result, error, started_at, completed_at";

const CHECKPOINT_COLUMNS: &str =
    "id, execution_id, context_snapshot, completed_steps, pending_steps, created_at";

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Parse a snake_case enum name through its serde representation.
fn parse_enum<T: serde::de::DeserializeOwned>(s: &str, what: &str) -> Result<T, RepositoryError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| RepositoryError::Query(format!("invalid {what}: {s}")))
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Query(e.to_string()))
}

/// Map a write failure, turning constraint violations into domain errors.
///
/// A foreign key violation means the parent row is missing, reported as
/// `missing_parent`.
fn map_write_error(e: sqlx::Error, missing_parent: RepositoryError) -> RepositoryError {
    match e.as_database_error() {
        Some(db) if db.is_foreign_key_violation() => missing_parent,
        Some(db) if db.is_unique_violation() => RepositoryError::Conflict(db.message().to_string()),
        _ => RepositoryError::Query(e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// WorkflowRepository impl
// ---------------------------------------------------------------------------

impl WorkflowRepository for SqliteWorkflowRepository {
    async fn create_workflow(
        &self,
        def: &WorkflowDefinition,
    ) -> Result<StoredWorkflow, RepositoryError> {
        let definition_json = to_json(def)?;
        let now = format_datetime(&Utc::now());

        // Upsert by name keeps the original id and created_at.
        let row = sqlx::query(
            r#"INSERT INTO workflows (id, name, definition, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(name) DO UPDATE SET
                 definition = excluded.definition,
                 updated_at = excluded.updated_at
               RETURNING id, name, definition, created_at, updated_at"#,
        )
        .bind(Uuid::now_v7().to_string())
        .bind(&def.name)
        .bind(&definition_json)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        WorkflowRow::from_row(&row)
            .map_err(|e| RepositoryError::Query(e.to_string()))?
            .into_stored()
    }

    async fn get_workflow_by_name(
        &self,
        name: &str,
    ) -> Result<Option<StoredWorkflow>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, definition, created_at, updated_at FROM workflows WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = WorkflowRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_stored()?))
            }
            None => Ok(None),
        }
    }

    async fn get_workflow_by_id(
        &self,
        id: &Uuid,
    ) -> Result<Option<StoredWorkflow>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, definition, created_at, updated_at FROM workflows WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = WorkflowRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_stored()?))
            }
            None => Ok(None),
        }
    }

    async fn create_execution(
        &self,
        workflow_id: &Uuid,
        context: &Context,
        triggered_by: &str,
        priority: i32,
        parent_execution_id: Option<&Uuid>,
    ) -> Result<WorkflowExecution, RepositoryError> {
        let missing_workflow =
            || RepositoryError::Conflict(format!("workflow {workflow_id} does not exist"));

        // Snapshot the stored definition onto the execution row.
        let stored: Option<(String,)> =
            sqlx::query_as("SELECT definition FROM workflows WHERE id = ?")
                .bind(workflow_id.to_string())
                .fetch_optional(&self.pool.writer)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let (definition_json,) = stored.ok_or_else(missing_workflow)?;
        let definition: WorkflowDefinition = serde_json::from_str(&definition_json)
            .map_err(|e| RepositoryError::Query(format!("invalid workflow definition JSON: {e}")))?;

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

        sqlx::query(
            r#"INSERT INTO workflow_executions
               (id, workflow_id, definition, state, context, triggered_by, priority,
                parent_execution_id, started_at, resume_count)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0)"#,
        )
        .bind(execution.id.to_string())
        .bind(workflow_id.to_string())
        .bind(&definition_json)
        .bind(execution.state.as_str())
        .bind(to_json(context)?)
        .bind(triggered_by)
        .bind(i64::from(priority))
        .bind(parent_execution_id.map(|id| id.to_string()))
        .bind(format_datetime(&execution.started_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| map_write_error(e, missing_workflow()))?;

        Ok(execution)
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<WorkflowExecution>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM workflow_executions WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = ExecutionRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_execution()?))
            }
            None => Ok(None),
        }
    }

    async fn update_execution_state(
        &self,
        id: &Uuid,
        state: WorkflowState,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let (completed_at, duration_ms) = if state.is_terminal() {
            let started: Option<(String,)> =
                sqlx::query_as("SELECT started_at FROM workflow_executions WHERE id = ?")
                    .bind(id.to_string())
                    .fetch_optional(&self.pool.writer)
                    .await
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
            let (started_at,) = started.ok_or(RepositoryError::NotFound)?;

            let now = Utc::now();
            let elapsed = (now - parse_datetime(&started_at)?).num_milliseconds().max(0);
            (Some(format_datetime(&now)), Some(elapsed))
        } else {
            (None, None)
        };

        let result = sqlx::query(
            r#"UPDATE workflow_executions
               SET state = ?, error = ?, completed_at = ?, duration_ms = ?
               WHERE id = ?"#,
        )
        .bind(state.as_str())
        .bind(error)
        .bind(&completed_at)
        .bind(duration_ms)
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn update_execution_context(
        &self,
        id: &Uuid,
        context: &Context,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE workflow_executions SET context = ? WHERE id = ?")
            .bind(to_json(context)?)
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn increment_resume_count(&self, id: &Uuid) -> Result<u32, RepositoryError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "UPDATE workflow_executions SET resume_count = resume_count + 1 \
             WHERE id = ? RETURNING resume_count",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|(count,)| count.max(0) as u32)
            .ok_or(RepositoryError::NotFound)
    }

    async fn list_executions_by_state(
        &self,
        state: WorkflowState,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM workflow_executions WHERE state = ? ORDER BY rowid ASC"
        ))
        .bind(state.as_str())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut executions = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = ExecutionRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            executions.push(r.into_execution()?);
        }
        Ok(executions)
    }

    async fn create_step_execution(
        &self,
        execution_id: &Uuid,
        step_key: &str,
        state: StepState,
        agent: &str,
    ) -> Result<StepExecution, RepositoryError> {
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

        sqlx::query(
            r#"INSERT INTO step_executions
               (id, execution_id, step_key, agent, state, started_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(step.id.to_string())
        .bind(execution_id.to_string())
        .bind(step_key)
        .bind(agent)
        .bind(state.as_str())
        .bind(step.started_at.as_ref().map(format_datetime))
        .bind(step.completed_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| map_write_error(e, RepositoryError::NotFound))?;

        Ok(step)
    }

    async fn update_step_execution_state(
        &self,
        id: &Uuid,
        state: StepState,
        result: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let now = format_datetime(&Utc::now());
        let result_json = result.map(to_json).transpose()?;
        let started_at = (state == StepState::Running).then(|| now.clone());
        let completed_at = state.is_terminal().then_some(now);

        let outcome = sqlx::query(
            r#"UPDATE step_executions SET
                 state = ?,
                 result = COALESCE(?, result),
                 error = COALESCE(?, error),
                 started_at = COALESCE(started_at, ?),
                 completed_at = COALESCE(?, completed_at)
               WHERE id = ?"#,
        )
        .bind(state.as_str())
        .bind(&result_json)
        .bind(error)
        .bind(&started_at)
        .bind(&completed_at)
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if outcome.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_step_executions(
        &self,
        execution_id: &Uuid,
    ) -> Result<Vec<StepExecution>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {STEP_COLUMNS} FROM step_executions WHERE execution_id = ? ORDER BY rowid ASC"
        ))
        .bind(execution_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut steps = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = StepRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            steps.push(r.into_step_execution()?);
        }
        Ok(steps)
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

        sqlx::query(
            r#"INSERT INTO execution_events (id, execution_id, event_type, event_data, created_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(event.id.to_string())
        .bind(execution_id.to_string())
        .bind(event_type.as_str())
        .bind(to_json(event_data)?)
        .bind(format_datetime(&event.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| map_write_error(e, RepositoryError::NotFound))?;

        Ok(event)
    }

    async fn list_events(
        &self,
        execution_id: &Uuid,
    ) -> Result<Vec<ExecutionEvent>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT id, execution_id, event_type, event_data, created_at
               FROM execution_events WHERE execution_id = ? ORDER BY rowid ASC"#,
        )
        .bind(execution_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = EventRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            events.push(r.into_event()?);
        }
        Ok(events)
    }

    async fn create_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO checkpoints
               (id, execution_id, context_snapshot, completed_steps, pending_steps, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(checkpoint.id.to_string())
        .bind(checkpoint.execution_id.to_string())
        .bind(to_json(&checkpoint.context_snapshot)?)
        .bind(to_json(&checkpoint.completed_steps)?)
        .bind(to_json(&checkpoint.pending_steps)?)
        .bind(format_datetime(&checkpoint.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| map_write_error(e, RepositoryError::NotFound))?;

        Ok(())
    }

    async fn restore_checkpoint(&self, id: &Uuid) -> Result<Option<Checkpoint>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {CHECKPOINT_COLUMNS} FROM checkpoints WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = CheckpointRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_checkpoint()?))
            }
            None => Ok(None),
        }
    }

    async fn latest_checkpoint(
        &self,
        execution_id: &Uuid,
    ) -> Result<Option<Checkpoint>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {CHECKPOINT_COLUMNS} FROM checkpoints WHERE execution_id = ? \
             ORDER BY rowid DESC LIMIT 1"
        ))
        .bind(execution_id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = CheckpointRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_checkpoint()?))
            }
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
