use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::PgPool;
use sqlx::types::Json;

use armada_domain::{Job, JobStatus};

use crate::{JobStore, StoreError};

use super::rows::JobRow;

/// PostgreSQL-backed job repository.
///
/// `priority_rank` is a denormalized integer written on every save so the
/// claim scan and status listings can order on an indexed column; the
/// `priority` text column remains the source of truth for decoding.
pub struct PgJobStore {
  pool: PgPool,
}

impl PgJobStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl JobStore for PgJobStore {
  async fn save(&self, job: &Job) -> Result<(), StoreError> {
    sqlx::query(
      r#"
            INSERT INTO jobs (
                id, workflow_id, workflow_name, robot_id, robot_name,
                status, priority, priority_rank, environment, workflow_json,
                scheduled_time, started_at, completed_at, duration_ms,
                progress, current_node, result, logs, error_message,
                created_at, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                    $13, $14, $15, $16, $17, $18, $19, $20, $21)
            ON CONFLICT (id) DO UPDATE SET
                workflow_id = EXCLUDED.workflow_id,
                workflow_name = EXCLUDED.workflow_name,
                robot_id = EXCLUDED.robot_id,
                robot_name = EXCLUDED.robot_name,
                status = EXCLUDED.status,
                priority = EXCLUDED.priority,
                priority_rank = EXCLUDED.priority_rank,
                environment = EXCLUDED.environment,
                workflow_json = EXCLUDED.workflow_json,
                scheduled_time = EXCLUDED.scheduled_time,
                started_at = EXCLUDED.started_at,
                completed_at = EXCLUDED.completed_at,
                duration_ms = EXCLUDED.duration_ms,
                progress = EXCLUDED.progress,
                current_node = EXCLUDED.current_node,
                result = EXCLUDED.result,
                logs = EXCLUDED.logs,
                error_message = EXCLUDED.error_message,
                created_by = EXCLUDED.created_by
            "#,
    )
    .bind(&job.id)
    .bind(&job.workflow_id)
    .bind(&job.workflow_name)
    .bind(&job.robot_id)
    .bind(&job.robot_name)
    .bind(job.status.as_str())
    .bind(job.priority.as_str())
    .bind(job.priority.rank())
    .bind(&job.environment)
    .bind(&job.workflow_json)
    .bind(job.scheduled_time)
    .bind(job.started_at)
    .bind(job.completed_at)
    .bind(job.duration_ms)
    .bind(job.progress as i32)
    .bind(&job.current_node)
    .bind(Json(&job.result))
    .bind(&job.logs)
    .bind(&job.error_message)
    .bind(job.created_at)
    .bind(&job.created_by)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_by_id(&self, id: &str) -> Result<Option<Job>, StoreError> {
    let row: Option<JobRow> = sqlx::query_as(
      r#"
            SELECT id, workflow_id, workflow_name, robot_id, robot_name,
                   status, priority, environment, workflow_json,
                   scheduled_time, started_at, completed_at, duration_ms,
                   progress, current_node, result, logs, error_message,
                   created_at, created_by
            FROM jobs
            WHERE id = $1
            "#,
    )
    .bind(id)
    .fetch_optional(&self.pool)
    .await?;

    Ok(row.map(Job::from))
  }

  async fn get_by_robot(&self, robot_id: &str) -> Result<Vec<Job>, StoreError> {
    let rows: Vec<JobRow> = sqlx::query_as(
      r#"
            SELECT id, workflow_id, workflow_name, robot_id, robot_name,
                   status, priority, environment, workflow_json,
                   scheduled_time, started_at, completed_at, duration_ms,
                   progress, current_node, result, logs, error_message,
                   created_at, created_by
            FROM jobs
            WHERE robot_id = $1
            ORDER BY created_at DESC
            "#,
    )
    .bind(robot_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(Job::from).collect())
  }

  async fn get_by_workflow(&self, workflow_id: &str) -> Result<Vec<Job>, StoreError> {
    let rows: Vec<JobRow> = sqlx::query_as(
      r#"
            SELECT id, workflow_id, workflow_name, robot_id, robot_name,
                   status, priority, environment, workflow_json,
                   scheduled_time, started_at, completed_at, duration_ms,
                   progress, current_node, result, logs, error_message,
                   created_at, created_by
            FROM jobs
            WHERE workflow_id = $1
            ORDER BY created_at DESC
            "#,
    )
    .bind(workflow_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(Job::from).collect())
  }

  async fn get_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError> {
    let rows: Vec<JobRow> = sqlx::query_as(
      r#"
            SELECT id, workflow_id, workflow_name, robot_id, robot_name,
                   status, priority, environment, workflow_json,
                   scheduled_time, started_at, completed_at, duration_ms,
                   progress, current_node, result, logs, error_message,
                   created_at, created_by
            FROM jobs
            WHERE status = $1
            ORDER BY priority_rank DESC, created_at ASC
            "#,
    )
    .bind(status.as_str())
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(Job::from).collect())
  }

  async fn get_pending_for_robot(&self, robot_id: &str) -> Result<Vec<Job>, StoreError> {
    let rows: Vec<JobRow> = sqlx::query_as(
      r#"
            SELECT id, workflow_id, workflow_name, robot_id, robot_name,
                   status, priority, environment, workflow_json,
                   scheduled_time, started_at, completed_at, duration_ms,
                   progress, current_node, result, logs, error_message,
                   created_at, created_by
            FROM jobs
            WHERE robot_id = $1 AND status IN ('pending', 'queued')
            ORDER BY priority_rank DESC, created_at ASC
            "#,
    )
    .bind(robot_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(Job::from).collect())
  }

  async fn claim_next_job(&self, robot_id: &str) -> Result<Option<Job>, StoreError> {
    // SKIP LOCKED makes concurrent claimants see the next eligible row
    // instead of blocking on one another; the row lock held until commit
    // guarantees at most one claimant wins each job.
    let mut tx = self.pool.begin().await?;

    let row: Option<JobRow> = sqlx::query_as(
      r#"
            SELECT id, workflow_id, workflow_name, robot_id, robot_name,
                   status, priority, environment, workflow_json,
                   scheduled_time, started_at, completed_at, duration_ms,
                   progress, current_node, result, logs, error_message,
                   created_at, created_by
            FROM jobs
            WHERE robot_id = $1
              AND status = 'pending'
              AND (scheduled_time IS NULL OR scheduled_time <= now())
            ORDER BY priority_rank DESC, created_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT 1
            "#,
    )
    .bind(robot_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
      tx.commit().await?;
      return Ok(None);
    };

    sqlx::query("UPDATE jobs SET status = 'queued' WHERE id = $1")
      .bind(&row.id)
      .execute(&mut *tx)
      .await?;

    tx.commit().await?;

    let mut job = Job::from(row);
    job.status = JobStatus::Queued;
    Ok(Some(job))
  }

  async fn update_status(
    &self,
    id: &str,
    status: JobStatus,
    result: Option<&Map<String, Value>>,
    error_message: Option<&str>,
  ) -> Result<bool, StoreError> {
    let outcome = sqlx::query(
      r#"
            UPDATE jobs
            SET status = $2,
                started_at = CASE
                    WHEN $2 = 'running' AND started_at IS NULL THEN now()
                    ELSE started_at
                END,
                completed_at = CASE
                    WHEN $2 IN ('completed', 'failed', 'cancelled', 'timeout')
                         AND completed_at IS NULL THEN now()
                    ELSE completed_at
                END,
                duration_ms = CASE
                    WHEN $2 IN ('completed', 'failed', 'cancelled', 'timeout')
                         AND started_at IS NOT NULL
                    THEN (EXTRACT(EPOCH FROM (COALESCE(completed_at, now()) - started_at)) * 1000)::bigint
                    ELSE duration_ms
                END,
                result = COALESCE($3, result),
                error_message = COALESCE($4, error_message)
            WHERE id = $1
            "#,
    )
    .bind(id)
    .bind(status.as_str())
    .bind(result.map(Json))
    .bind(error_message)
    .execute(&self.pool)
    .await?;

    Ok(outcome.rows_affected() > 0)
  }

  async fn update_progress(&self, id: &str, progress: i32) -> Result<bool, StoreError> {
    let result = sqlx::query(
      "UPDATE jobs SET progress = LEAST(100, GREATEST(0, $2)) WHERE id = $1",
    )
    .bind(id)
    .bind(progress)
    .execute(&self.pool)
    .await?;

    Ok(result.rows_affected() > 0)
  }

  async fn update_current_node(&self, id: &str, node_id: &str) -> Result<bool, StoreError> {
    let result = sqlx::query("UPDATE jobs SET current_node = $2 WHERE id = $1")
      .bind(id)
      .bind(node_id)
      .execute(&self.pool)
      .await?;

    Ok(result.rows_affected() > 0)
  }

  async fn append_logs(&self, id: &str, chunk: &str) -> Result<bool, StoreError> {
    let result = sqlx::query("UPDATE jobs SET logs = logs || $2 WHERE id = $1")
      .bind(id)
      .bind(chunk)
      .execute(&self.pool)
      .await?;

    Ok(result.rows_affected() > 0)
  }

  async fn calculate_duration(&self, id: &str) -> Result<Option<i64>, StoreError> {
    let duration: Option<i64> = sqlx::query_scalar(
      r#"
            UPDATE jobs
            SET duration_ms = (EXTRACT(EPOCH FROM (completed_at - started_at)) * 1000)::bigint
            WHERE id = $1 AND started_at IS NOT NULL AND completed_at IS NOT NULL
            RETURNING duration_ms
            "#,
    )
    .bind(id)
    .fetch_optional(&self.pool)
    .await?;

    Ok(duration)
  }

  async fn delete(&self, id: &str) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
      .bind(id)
      .execute(&self.pool)
      .await?;

    Ok(result.rows_affected() > 0)
  }

  async fn delete_old_jobs(&self, days: i64) -> Result<u64, StoreError> {
    let result = sqlx::query(
      r#"
            DELETE FROM jobs
            WHERE status IN ('completed', 'failed', 'cancelled', 'timeout')
              AND created_at < now() - make_interval(days => $1)
            "#,
    )
    .bind(days as i32)
    .execute(&self.pool)
    .await?;

    Ok(result.rows_affected())
  }
}
