//! SQLite-backed store.
//!
//! Local-first persistence: one database file, four tables with
//! JSON-encoded nested columns, and the indices the listing queries
//! need. The pool is capped at a single connection; combined with
//! per-operation transactions this serializes every write, which is the
//! store's single-writer contract.

use crate::error::StoreError;
use crate::store::{Store, Template};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowstone_core::{ExecutionId, NodeId, TemplateId, WorkflowId};
use flowstone_workflow::definition::{Workflow, WorkflowSummary, WorkflowUpdate};
use flowstone_workflow::execution::{
    Execution, ExecutionUpdate, LogLine, NodeState, NodeStatus,
};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

/// Recent-log window kept on the execution row. The full log lives in
/// the `logs` table.
const LOG_WINDOW: usize = 100;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS workflows (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    description TEXT,
    nodes       TEXT NOT NULL,
    edges       TEXT NOT NULL,
    variables   TEXT,
    metadata    TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS executions (
    id           TEXT PRIMARY KEY,
    workflow_id  TEXT NOT NULL,
    status       TEXT NOT NULL,
    input        TEXT NOT NULL,
    output       TEXT,
    error        TEXT,
    started_at   TEXT NOT NULL,
    completed_at TEXT,
    node_states  TEXT NOT NULL,
    logs         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_executions_workflow_id ON executions(workflow_id);

CREATE TABLE IF NOT EXISTS templates (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    description TEXT,
    category    TEXT NOT NULL,
    workflow    TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_templates_category ON templates(category);

CREATE TABLE IF NOT EXISTS logs (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    execution_id TEXT NOT NULL,
    node_id      TEXT,
    level        TEXT NOT NULL,
    message      TEXT NOT NULL,
    data         TEXT,
    timestamp    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_logs_execution_id ON logs(execution_id);
"#;

/// The SQLite store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns a `Storage` error if the file cannot be opened or the
    /// schema cannot be applied.
    pub async fn connect(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::with_options(options).await
    }

    /// Opens an in-memory database. Used by tests and `--dry-run` paths.
    ///
    /// # Errors
    ///
    /// Returns a `Storage` error if the schema cannot be applied.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(sqlx::Error::from)?;
        Self::with_options(options).await
    }

    async fn with_options(options: SqliteConnectOptions) -> Result<Self, StoreError> {
        // One connection, held forever: the single-writer discipline,
        // and what keeps an in-memory database alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }
}

#[derive(FromRow)]
struct WorkflowRow {
    id: String,
    name: String,
    description: Option<String>,
    nodes: String,
    edges: String,
    variables: Option<String>,
    metadata: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WorkflowRow {
    fn try_into_workflow(self) -> Result<Workflow, StoreError> {
        let corrupt = |reason: String| StoreError::corrupt("workflow", self.id.clone(), reason);

        Ok(Workflow {
            id: WorkflowId::from(self.id.clone()),
            name: self.name.clone(),
            description: self.description.clone(),
            nodes: serde_json::from_str(&self.nodes).map_err(|e| corrupt(e.to_string()))?,
            edges: serde_json::from_str(&self.edges).map_err(|e| corrupt(e.to_string()))?,
            variables: decode_optional_json(self.variables.as_deref())
                .map_err(|e| corrupt(e.to_string()))?,
            metadata: decode_optional_json(self.metadata.as_deref())
                .map_err(|e| corrupt(e.to_string()))?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ExecutionRow {
    id: String,
    workflow_id: String,
    status: String,
    input: String,
    output: Option<String>,
    error: Option<String>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    node_states: String,
    logs: String,
}

impl ExecutionRow {
    fn try_into_execution(self) -> Result<Execution, StoreError> {
        let corrupt = |reason: String| StoreError::corrupt("execution", self.id.clone(), reason);

        let id = ExecutionId::from_str(&self.id).map_err(|e| corrupt(e.to_string()))?;
        let node_states: HashMap<NodeId, NodeState> =
            serde_json::from_str(&self.node_states).map_err(|e| corrupt(e.to_string()))?;

        Ok(Execution {
            id,
            workflow_id: WorkflowId::from(self.workflow_id.clone()),
            status: decode_enum(&self.status).map_err(|e| corrupt(e.to_string()))?,
            input: serde_json::from_str(&self.input).map_err(|e| corrupt(e.to_string()))?,
            output: decode_optional_json(self.output.as_deref())
                .map_err(|e| corrupt(e.to_string()))?,
            error: self.error.clone(),
            started_at: self.started_at,
            completed_at: self.completed_at,
            node_states,
            logs: serde_json::from_str(&self.logs).map_err(|e| corrupt(e.to_string()))?,
        })
    }
}

#[derive(FromRow)]
struct TemplateRow {
    id: String,
    name: String,
    description: Option<String>,
    category: String,
    workflow: String,
    created_at: DateTime<Utc>,
}

impl TemplateRow {
    fn try_into_template(self) -> Result<Template, StoreError> {
        let corrupt = |reason: String| StoreError::corrupt("template", self.id.clone(), reason);

        Ok(Template {
            id: TemplateId::from_str(&self.id).map_err(|e| corrupt(e.to_string()))?,
            name: self.name.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            workflow: serde_json::from_str(&self.workflow).map_err(|e| corrupt(e.to_string()))?,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct LogRow {
    node_id: Option<String>,
    level: String,
    message: String,
    data: Option<String>,
    timestamp: DateTime<Utc>,
}

impl LogRow {
    fn try_into_line(self) -> Result<LogLine, StoreError> {
        let corrupt = |reason: String| StoreError::corrupt("log", self.message.clone(), reason);

        Ok(LogLine {
            timestamp: self.timestamp,
            level: decode_enum(&self.level).map_err(|e| corrupt(e.to_string()))?,
            node_id: self.node_id.clone().map(NodeId::from),
            message: self.message.clone(),
            data: decode_optional_json(self.data.as_deref()).map_err(|e| corrupt(e.to_string()))?,
        })
    }
}

/// Decodes a lowercase enum column through its serde representation.
fn decode_enum<T: DeserializeOwned>(s: &str) -> Result<T, serde_json::Error> {
    serde_json::from_value(JsonValue::String(s.to_string()))
}

fn decode_optional_json<T: DeserializeOwned>(
    s: Option<&str>,
) -> Result<Option<T>, serde_json::Error> {
    s.map(serde_json::from_str).transpose()
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Storage {
        message: format!("failed to encode record: {e}"),
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_workflow(&self, workflow: &Workflow) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO workflows (id, name, description, nodes, edges, variables, metadata, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(workflow.id.as_str())
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(encode_json(&workflow.nodes)?)
        .bind(encode_json(&workflow.edges)?)
        .bind(workflow.variables.as_ref().map(encode_json).transpose()?)
        .bind(workflow.metadata.as_ref().map(encode_json).transpose()?)
        .bind(workflow.created_at)
        .bind(workflow.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_workflow(
        &self,
        id: &WorkflowId,
        update: WorkflowUpdate,
    ) -> Result<Workflow, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<WorkflowRow> = sqlx::query_as("SELECT * FROM workflows WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let mut workflow = row
            .ok_or_else(|| StoreError::not_found("workflow", id.as_str()))?
            .try_into_workflow()?;

        workflow.apply(update);

        sqlx::query(
            r#"
            UPDATE workflows
            SET name = ?, description = ?, nodes = ?, edges = ?, variables = ?, metadata = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(encode_json(&workflow.nodes)?)
        .bind(encode_json(&workflow.edges)?)
        .bind(workflow.variables.as_ref().map(encode_json).transpose()?)
        .bind(workflow.metadata.as_ref().map(encode_json).transpose()?)
        .bind(workflow.updated_at)
        .bind(workflow.id.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(workflow)
    }

    async fn delete_workflow(&self, id: &WorkflowId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("workflow", id.as_str()));
        }
        Ok(())
    }

    async fn get_workflow(&self, id: &WorkflowId) -> Result<Option<Workflow>, StoreError> {
        let row: Option<WorkflowRow> = sqlx::query_as("SELECT * FROM workflows WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(WorkflowRow::try_into_workflow).transpose()
    }

    async fn list_workflows(&self) -> Result<Vec<WorkflowSummary>, StoreError> {
        let rows: Vec<WorkflowRow> =
            sqlx::query_as("SELECT * FROM workflows ORDER BY updated_at DESC")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter()
            .map(|row| row.try_into_workflow().map(|w| WorkflowSummary::from(&w)))
            .collect()
    }

    async fn create_execution(&self, execution: &Execution) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO executions (id, workflow_id, status, input, output, error, started_at, completed_at, node_states, logs)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(execution.id.to_string())
        .bind(execution.workflow_id.as_str())
        .bind(execution.status.as_str())
        .bind(encode_json(&execution.input)?)
        .bind(execution.output.as_ref().map(encode_json).transpose()?)
        .bind(&execution.error)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(encode_json(&execution.node_states)?)
        .bind(encode_json(&execution.logs)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_execution(
        &self,
        id: ExecutionId,
        update: ExecutionUpdate,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<ExecutionRow> = sqlx::query_as("SELECT * FROM executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let mut execution = row
            .ok_or_else(|| StoreError::not_found("execution", id.to_string()))?
            .try_into_execution()?;

        execution.apply(update);

        sqlx::query(
            "UPDATE executions SET status = ?, output = ?, error = ?, completed_at = ? WHERE id = ?",
        )
        .bind(execution.status.as_str())
        .bind(execution.output.as_ref().map(encode_json).transpose()?)
        .bind(&execution.error)
        .bind(execution.completed_at)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_execution(&self, id: ExecutionId) -> Result<Option<Execution>, StoreError> {
        let row: Option<ExecutionRow> = sqlx::query_as("SELECT * FROM executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(ExecutionRow::try_into_execution).transpose()
    }

    async fn list_executions(
        &self,
        workflow_id: Option<&WorkflowId>,
    ) -> Result<Vec<Execution>, StoreError> {
        let rows: Vec<ExecutionRow> = match workflow_id {
            Some(workflow_id) => {
                sqlx::query_as(
                    "SELECT * FROM executions WHERE workflow_id = ? ORDER BY started_at DESC",
                )
                .bind(workflow_id.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM executions ORDER BY started_at DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.into_iter()
            .map(ExecutionRow::try_into_execution)
            .collect()
    }

    async fn update_execution_node_state(
        &self,
        execution_id: ExecutionId,
        node_id: &NodeId,
        status: NodeStatus,
        output: Option<JsonValue>,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(String,)> =
            sqlx::query_as("SELECT node_states FROM executions WHERE id = ?")
                .bind(execution_id.to_string())
                .fetch_optional(&mut *tx)
                .await?;
        let states_json = row
            .ok_or_else(|| StoreError::not_found("execution", execution_id.to_string()))?
            .0;

        let mut states: HashMap<NodeId, NodeState> = serde_json::from_str(&states_json)
            .map_err(|e| {
                StoreError::corrupt("execution", execution_id.to_string(), e.to_string())
            })?;

        let state = states.entry(node_id.clone()).or_default();
        match status {
            NodeStatus::Pending => {}
            NodeStatus::Running => *state = NodeState::running(),
            NodeStatus::Completed => state.complete(output.unwrap_or(JsonValue::Null)),
            NodeStatus::Error => state.fail(error.unwrap_or_default()),
            NodeStatus::Skipped => state.skip(),
        }

        sqlx::query("UPDATE executions SET node_states = ? WHERE id = ?")
            .bind(encode_json(&states)?)
            .bind(execution_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn append_log(&self, execution_id: ExecutionId, line: LogLine) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(String,)> = sqlx::query_as("SELECT logs FROM executions WHERE id = ?")
            .bind(execution_id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let logs_json = row
            .ok_or_else(|| StoreError::not_found("execution", execution_id.to_string()))?
            .0;

        sqlx::query(
            "INSERT INTO logs (execution_id, node_id, level, message, data, timestamp) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(execution_id.to_string())
        .bind(line.node_id.as_ref().map(|n| n.as_str().to_string()))
        .bind(line.level.as_str())
        .bind(&line.message)
        .bind(line.data.as_ref().map(encode_json).transpose()?)
        .bind(line.timestamp)
        .execute(&mut *tx)
        .await?;

        let mut window: Vec<LogLine> = serde_json::from_str(&logs_json).map_err(|e| {
            StoreError::corrupt("execution", execution_id.to_string(), e.to_string())
        })?;
        window.push(line);
        if window.len() > LOG_WINDOW {
            let excess = window.len() - LOG_WINDOW;
            window.drain(..excess);
        }

        sqlx::query("UPDATE executions SET logs = ? WHERE id = ?")
            .bind(encode_json(&window)?)
            .bind(execution_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn logs(&self, execution_id: ExecutionId) -> Result<Vec<LogLine>, StoreError> {
        let rows: Vec<LogRow> = sqlx::query_as(
            "SELECT node_id, level, message, data, timestamp FROM logs WHERE execution_id = ? ORDER BY id ASC",
        )
        .bind(execution_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LogRow::try_into_line).collect()
    }

    async fn create_template(&self, template: &Template) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO templates (id, name, description, category, workflow, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(template.id.to_string())
        .bind(&template.name)
        .bind(&template.description)
        .bind(&template.category)
        .bind(encode_json(&template.workflow)?)
        .bind(template.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_template(&self, id: &TemplateId) -> Result<Option<Template>, StoreError> {
        let row: Option<TemplateRow> = sqlx::query_as("SELECT * FROM templates WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TemplateRow::try_into_template).transpose()
    }

    async fn list_templates(&self, category: Option<&str>) -> Result<Vec<Template>, StoreError> {
        let rows: Vec<TemplateRow> = match category {
            Some(category) => {
                sqlx::query_as(
                    "SELECT * FROM templates WHERE category = ? ORDER BY created_at DESC",
                )
                .bind(category)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM templates ORDER BY created_at DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.into_iter().map(TemplateRow::try_into_template).collect()
    }
}
