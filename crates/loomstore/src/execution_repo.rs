use crate::workflow_repo::parse_timestamp;
use crate::Database;
use loomcore::{ExecutionRecord, LoomError, Result, RunStatus};
use rusqlite::params;

/// Append-only store of run outcomes
///
/// Records are written once per persisted run and never mutated; queries
/// page newest-first.
#[derive(Clone)]
pub struct ExecutionRepository {
    db: Database,
}

impl ExecutionRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn append(&self, record: &ExecutionRecord) -> Result<()> {
        let execution_data = serde_json::to_string(&record.execution_data)?;
        self.db.with_connection(|conn| {
            conn.execute(
                r#"
                INSERT INTO executions
                    (id, workflow_id, status, duration_seconds, execution_data, diagnostic, started_at, completed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    record.id,
                    record.workflow_id,
                    status_str(record.status),
                    record.duration_seconds,
                    execution_data,
                    record.diagnostic,
                    record.started_at.to_rfc3339(),
                    record.completed_at.to_rfc3339(),
                ],
            )
            .map_err(LoomError::storage)?;
            Ok(())
        })
    }

    /// Newest-first page of records for one workflow; an offset past the
    /// end yields an empty page.
    pub fn list(&self, workflow_id: &str, limit: u32, offset: u32) -> Result<Vec<ExecutionRecord>> {
        let rows = self.db.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT id, workflow_id, status, duration_seconds, execution_data, diagnostic, started_at, completed_at
                    FROM executions
                    WHERE workflow_id = ?1
                    ORDER BY started_at DESC
                    LIMIT ?2 OFFSET ?3
                    "#,
                )
                .map_err(LoomError::storage)?;
            let rows = stmt
                .query_map(params![workflow_id, limit, offset], ExecutionRow::from_row)
                .map_err(LoomError::storage)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(LoomError::storage)?;
            Ok(rows)
        })?;

        rows.into_iter().map(ExecutionRow::into_record).collect()
    }

    pub fn count(&self, workflow_id: &str) -> Result<u64> {
        self.db.with_connection(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM executions WHERE workflow_id = ?1",
                params![workflow_id],
                |row| row.get::<_, i64>(0),
            )
            .map(|count| count.max(0) as u64)
            .map_err(LoomError::storage)
        })
    }
}

fn status_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Success => "success",
        RunStatus::Error => "error",
    }
}

struct ExecutionRow {
    id: String,
    workflow_id: Option<String>,
    status: String,
    duration_seconds: f64,
    execution_data: String,
    diagnostic: Option<String>,
    started_at: String,
    completed_at: String,
}

impl ExecutionRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            workflow_id: row.get(1)?,
            status: row.get(2)?,
            duration_seconds: row.get(3)?,
            execution_data: row.get(4)?,
            diagnostic: row.get(5)?,
            started_at: row.get(6)?,
            completed_at: row.get(7)?,
        })
    }

    fn into_record(self) -> Result<ExecutionRecord> {
        let status = match self.status.as_str() {
            "success" => RunStatus::Success,
            _ => RunStatus::Error,
        };
        Ok(ExecutionRecord {
            id: self.id,
            workflow_id: self.workflow_id,
            status,
            duration_seconds: self.duration_seconds,
            execution_data: serde_json::from_str(&self.execution_data)?,
            diagnostic: self.diagnostic,
            started_at: parse_timestamp(&self.started_at)?,
            completed_at: parse_timestamp(&self.completed_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WorkflowRepository;
    use chrono::{Duration, Utc};
    use loomcore::{NodeDefinition, NodeType, RunOutcome, Workflow, WorkflowData};
    use uuid::Uuid;

    fn stored_workflow(repo: &WorkflowRepository) -> Workflow {
        let mut data = WorkflowData::default();
        data.add_node("n1", NodeDefinition::new(NodeType::Start, "Start"));
        let workflow = Workflow::new("history target", data);
        repo.insert(&workflow).unwrap();
        workflow
    }

    fn record_at(workflow_id: &str, seconds_ago: i64) -> ExecutionRecord {
        let completed = Utc::now() - Duration::seconds(seconds_ago);
        ExecutionRecord {
            id: Uuid::new_v4().to_string(),
            workflow_id: Some(workflow_id.to_string()),
            status: RunStatus::Success,
            duration_seconds: 0.5,
            execution_data: RunOutcome::empty(),
            diagnostic: None,
            started_at: completed - Duration::seconds(1),
            completed_at: completed,
        }
    }

    #[test]
    fn pages_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let workflows = WorkflowRepository::new(db.clone());
        let executions = ExecutionRepository::new(db);
        let workflow = stored_workflow(&workflows);

        let old = record_at(&workflow.id, 120);
        let recent = record_at(&workflow.id, 10);
        executions.append(&old).unwrap();
        executions.append(&recent).unwrap();

        let page = executions.list(&workflow.id, 10, 0).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, recent.id);
        assert_eq!(page[1].id, old.id);
        assert_eq!(executions.count(&workflow.id).unwrap(), 2);
    }

    #[test]
    fn offset_past_end_is_empty_not_error() {
        let db = Database::open_in_memory().unwrap();
        let workflows = WorkflowRepository::new(db.clone());
        let executions = ExecutionRepository::new(db);
        let workflow = stored_workflow(&workflows);

        executions.append(&record_at(&workflow.id, 5)).unwrap();

        let page = executions.list(&workflow.id, 10, 99).unwrap();
        assert!(page.is_empty());
    }

    #[test]
    fn deleting_workflow_cascades_to_history() {
        let db = Database::open_in_memory().unwrap();
        let workflows = WorkflowRepository::new(db.clone());
        let executions = ExecutionRepository::new(db);
        let workflow = stored_workflow(&workflows);

        executions.append(&record_at(&workflow.id, 5)).unwrap();
        assert!(workflows.delete(&workflow.id).unwrap());

        assert_eq!(executions.count(&workflow.id).unwrap(), 0);
    }
}
