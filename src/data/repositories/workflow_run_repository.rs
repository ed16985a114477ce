use anyhow::{anyhow, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;

use crate::base::WorkflowRunRepository;
use crate::models::{WorkflowRun, WorkflowRunStatus};
use crate::utils::{current_timestamp, format_db_timestamp, parse_db_timestamp};

const RUN_COLUMNS: &str =
    "id, workflow_name, input_data, output_data, status, started_at, completed_at";

pub struct SqliteWorkflowRunRepository {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl SqliteWorkflowRunRepository {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn map_row(row: &Row) -> Result<WorkflowRun> {
        let status: String = row.get(4)?;
        Ok(WorkflowRun {
            id: row.get(0)?,
            workflow_name: row.get(1)?,
            input_data: row.get(2)?,
            output_data: row.get(3)?,
            status: WorkflowRunStatus::from_str(&status)
                .ok_or_else(|| anyhow!("Unknown workflow status: {}", status))?,
            started_at: parse_db_timestamp(&row.get::<_, String>(5)?)?,
            completed_at: row
                .get::<_, Option<String>>(6)?
                .map(|s| parse_db_timestamp(&s))
                .transpose()?,
        })
    }
}

impl WorkflowRunRepository for SqliteWorkflowRunRepository {
    fn start_run(&self, workflow_name: &str, input_data: &str) -> Result<i64> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO workflow_run_history (workflow_name, input_data, status, started_at)
             VALUES (?, ?, ?, ?)",
            params![
                workflow_name,
                input_data,
                WorkflowRunStatus::Started.as_str(),
                format_db_timestamp(current_timestamp()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn finish_run(&self, id: i64, status: WorkflowRunStatus, output_data: &str) -> Result<()> {
        let conn = self.pool.get()?;
        let updated = conn.execute(
            "UPDATE workflow_run_history SET status = ?, output_data = ?, completed_at = ? WHERE id = ?",
            params![
                status.as_str(),
                output_data,
                format_db_timestamp(current_timestamp()),
                id
            ],
        )?;
        if updated == 0 {
            return Err(anyhow!("Workflow run {} not found", id));
        }
        Ok(())
    }

    fn get_run(&self, id: i64) -> Result<Option<WorkflowRun>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM workflow_run_history WHERE id = ?",
            RUN_COLUMNS
        ))?;
        let row = stmt
            .query_row(params![id], |row| Ok(Self::map_row(row)))
            .optional()?;
        row.transpose()
    }

    fn get_recent_runs(&self, limit: usize) -> Result<Vec<WorkflowRun>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM workflow_run_history ORDER BY id DESC LIMIT ?",
            RUN_COLUMNS
        ))?;
        let mut rows = stmt.query(params![limit as i64])?;

        let mut runs = Vec::new();
        while let Some(row) = rows.next()? {
            runs.push(Self::map_row(row)?);
        }
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use crate::data::Database;
    use crate::models::WorkflowRunStatus;

    #[test]
    fn test_run_lifecycle() {
        let repo = Database::in_memory().unwrap().workflow_run_repository();

        let id = repo.start_run("add_user", r#"{"user_id":"alice"}"#).unwrap();
        let started = repo.get_run(id).unwrap().unwrap();
        assert_eq!(started.status, WorkflowRunStatus::Started);
        assert!(started.output_data.is_none());
        assert!(started.completed_at.is_none());

        repo.finish_run(id, WorkflowRunStatus::Completed, r#"{"error_message":null}"#).unwrap();

        let finished = repo.get_run(id).unwrap().unwrap();
        assert_eq!(finished.status, WorkflowRunStatus::Completed);
        assert!(finished.completed_at.is_some());
    }

    #[test]
    fn test_finish_unknown_run_fails() {
        let repo = Database::in_memory().unwrap().workflow_run_repository();
        assert!(repo.finish_run(42, WorkflowRunStatus::Error, "{}").is_err());
    }

    #[test]
    fn test_recent_runs_newest_first() {
        let repo = Database::in_memory().unwrap().workflow_run_repository();
        repo.start_run("first", "{}").unwrap();
        repo.start_run("second", "{}").unwrap();

        let runs = repo.get_recent_runs(1).unwrap();

        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].workflow_name, "second");
    }
}
