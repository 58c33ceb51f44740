//! Work items: one per input file
//!
//! Status writes are compare-and-set on the current status, so an operator
//! reset that lands while a step is running wins over the step's outcome.

use super::Store;
use crate::error::{PipelineError, Result};
use crate::pipeline::status::Status;
use serde::{Deserialize, Serialize};

const ITEM_COLUMNS: &str = "id, project, filename, raw_path, status, error, skip, job, sample, tag, \
                            total_runtime, created_at, updated_at";

/// Work item record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkItem {
    pub id: i64,
    pub project: String,
    /// Input file stem, unique within the project
    pub filename: String,
    pub raw_path: String,
    pub status: Status,
    /// Consecutive failures at the current status
    pub error: i64,
    pub skip: bool,
    pub job: i64,
    pub sample: Option<String>,
    pub tag: Option<String>,
    pub total_runtime: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl WorkItem {
    /// Frozen: the retry budget for the current step is spent.
    pub fn is_fatal(&self, error_limit: i64) -> bool {
        self.error >= error_limit
    }

    /// Whether the scheduler may pick this item.
    pub fn is_eligible(&self, error_limit: i64) -> bool {
        !self.skip && !self.status.is_terminal() && !self.is_fatal(error_limit)
    }
}

/// Input for registering a newly discovered file
#[derive(Debug, Clone)]
pub struct NewWorkItem {
    pub project: String,
    pub filename: String,
    pub raw_path: String,
    pub job: i64,
    pub sample: Option<String>,
}

impl Store {
    /// Register an item in `ADDED` together with its empty runtime ledger.
    pub async fn insert_item(&self, new: &NewWorkItem) -> Result<WorkItem> {
        let mut tx = self.pool().begin().await?;

        let inserted = sqlx::query_as::<_, WorkItem>(&format!(
            r#"
            INSERT INTO work_items (project, filename, raw_path, status, job, sample)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING {}
            "#,
            ITEM_COLUMNS
        ))
        .bind(&new.project)
        .bind(&new.filename)
        .bind(&new.raw_path)
        .bind(Status::Added)
        .bind(new.job)
        .bind(&new.sample)
        .fetch_one(&mut *tx)
        .await;

        let item = match inserted {
            Ok(item) => item,
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(PipelineError::duplicate(
                    "work item",
                    format!("{}/{}", new.project, new.filename),
                ));
            },
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                return Err(PipelineError::not_found("project", &new.project));
            },
            Err(e) => return Err(e.into()),
        };

        sqlx::query("INSERT INTO run_time_ledgers (item_id) VALUES (?1)")
            .bind(item.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(item)
    }

    pub async fn get_item(&self, id: i64) -> Result<WorkItem> {
        sqlx::query_as::<_, WorkItem>(&format!(
            "SELECT {} FROM work_items WHERE id = ?1",
            ITEM_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| PipelineError::not_found("work item", id))
    }

    /// Natural-key lookup.
    pub async fn find_item(&self, project: &str, filename: &str) -> Result<Option<WorkItem>> {
        let item = sqlx::query_as::<_, WorkItem>(&format!(
            "SELECT {} FROM work_items WHERE project = ?1 AND filename = ?2",
            ITEM_COLUMNS
        ))
        .bind(project)
        .bind(filename)
        .fetch_optional(self.pool())
        .await?;
        Ok(item)
    }

    pub async fn items_in_project(&self, project: &str) -> Result<Vec<WorkItem>> {
        let items = sqlx::query_as::<_, WorkItem>(&format!(
            "SELECT {} FROM work_items WHERE project = ?1 ORDER BY id",
            ITEM_COLUMNS
        ))
        .bind(project)
        .fetch_all(self.pool())
        .await?;
        Ok(items)
    }

    /// Highest-status eligible item of one partition, oldest first on ties.
    pub async fn next_eligible(
        &self,
        project: &str,
        job: i64,
        error_limit: i64,
    ) -> Result<Option<WorkItem>> {
        let item = sqlx::query_as::<_, WorkItem>(&format!(
            r#"
            SELECT {}
            FROM work_items
            WHERE project = ?1
              AND job = ?2
              AND skip = 0
              AND error < ?3
              AND status NOT IN (?4, ?5, ?6)
            ORDER BY status DESC, id ASC
            LIMIT 1
            "#,
            ITEM_COLUMNS
        ))
        .bind(project)
        .bind(job)
        .bind(error_limit)
        .bind(Status::TERMINAL[0])
        .bind(Status::TERMINAL[1])
        .bind(Status::TERMINAL[2])
        .fetch_optional(self.pool())
        .await?;
        Ok(item)
    }

    /// Move an item forward after a successful (or skipped) step.
    ///
    /// Returns `false` when the item is no longer at `from`.
    pub async fn advance_status(&self, id: i64, from: Status, to: Status) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE work_items
            SET status = ?3, error = 0, updated_at = datetime('now')
            WHERE id = ?1 AND status = ?2
            "#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .execute(self.pool())
        .await?
        .rows_affected();
        Ok(updated == 1)
    }

    /// Count one failed attempt at `status` and return the new error count.
    pub async fn record_failure(&self, id: i64, status: Status) -> Result<Option<i64>> {
        let error = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE work_items
            SET error = error + 1, updated_at = datetime('now')
            WHERE id = ?1 AND status = ?2
            RETURNING error
            "#,
        )
        .bind(id)
        .bind(status)
        .fetch_optional(self.pool())
        .await?;
        Ok(error)
    }

    pub async fn set_skip(&self, id: i64, skip: bool) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE work_items SET skip = ?2, updated_at = datetime('now') WHERE id = ?1",
        )
        .bind(id)
        .bind(skip)
        .execute(self.pool())
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(PipelineError::not_found("work item", id));
        }
        Ok(())
    }

    /// Operator reset: clear the error counter and/or send the item back to
    /// `ADDED`. Derived records are wiped by the `ADDED` step itself.
    pub async fn reset_item(&self, id: i64, to_added: bool, clear_error: bool) -> Result<WorkItem> {
        let item = self.get_item(id).await?;
        let status = if to_added { Status::Added } else { item.status };
        let error = if clear_error || to_added { 0 } else { item.error };

        sqlx::query(
            r#"
            UPDATE work_items
            SET status = ?2, error = ?3, updated_at = datetime('now')
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(error)
        .execute(self.pool())
        .await?;

        tracing::info!(
            item_id = id,
            from = %item.status,
            to = %status,
            error = error,
            "Work item reset"
        );
        self.get_item(id).await
    }

    /// Non-skipped items of a project still below `status`, across all
    /// partitions.
    pub async fn count_below(&self, project: &str, status: Status) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM work_items WHERE project = ?1 AND skip = 0 AND status < ?2",
        )
        .bind(project)
        .bind(status)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }

    /// Non-skipped items sitting exactly at `status`.
    pub async fn items_at(&self, project: &str, status: Status) -> Result<Vec<WorkItem>> {
        let items = sqlx::query_as::<_, WorkItem>(&format!(
            "SELECT {} FROM work_items WHERE project = ?1 AND skip = 0 AND status = ?2 ORDER BY id",
            ITEM_COLUMNS
        ))
        .bind(project)
        .bind(status)
        .fetch_all(self.pool())
        .await?;
        Ok(items)
    }

    /// Move every non-skipped item of a project from `from` to `to` in one
    /// statement. Returns the partitions that received work.
    pub async fn promote(&self, project: &str, from: Status, to: Status) -> Result<Vec<i64>> {
        let jobs = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE work_items
            SET status = ?3, error = 0, updated_at = datetime('now')
            WHERE project = ?1 AND skip = 0 AND status = ?2
            RETURNING job
            "#,
        )
        .bind(project)
        .bind(from)
        .bind(to)
        .fetch_all(self.pool())
        .await?;

        let mut jobs = jobs;
        jobs.sort_unstable();
        jobs.dedup();
        Ok(jobs)
    }

    pub async fn set_total_runtime(&self, id: i64, seconds: i64) -> Result<()> {
        sqlx::query("UPDATE work_items SET total_runtime = ?2 WHERE id = ?1")
            .bind(id)
            .bind(seconds)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Set or clear the sample label used by sample-based profiling.
    pub async fn set_sample(&self, id: i64, sample: Option<&str>) -> Result<()> {
        let updated = sqlx::query("UPDATE work_items SET sample = ?2 WHERE id = ?1")
            .bind(id)
            .bind(sample)
            .execute(self.pool())
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(PipelineError::not_found("work item", id));
        }
        Ok(())
    }
}
