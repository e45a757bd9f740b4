use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;

use armada_domain::{Robot, RobotCapability, RobotStatus};

use crate::{RobotStore, StoreError};

use super::rows::{RobotRow, capabilities_to_json};

/// PostgreSQL-backed robot repository.
pub struct PgRobotStore {
  pool: PgPool,
}

impl PgRobotStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl RobotStore for PgRobotStore {
  async fn save(&self, robot: &Robot) -> Result<(), StoreError> {
    sqlx::query(
      r#"
            INSERT INTO robots (
                id, name, hostname, status, environment, capabilities,
                max_concurrent_jobs, current_job_ids, tags, metrics,
                assigned_workflows, last_seen, last_heartbeat, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                hostname = EXCLUDED.hostname,
                status = EXCLUDED.status,
                environment = EXCLUDED.environment,
                capabilities = EXCLUDED.capabilities,
                max_concurrent_jobs = EXCLUDED.max_concurrent_jobs,
                current_job_ids = EXCLUDED.current_job_ids,
                tags = EXCLUDED.tags,
                metrics = EXCLUDED.metrics,
                assigned_workflows = EXCLUDED.assigned_workflows,
                last_seen = EXCLUDED.last_seen,
                last_heartbeat = EXCLUDED.last_heartbeat
            "#,
    )
    .bind(&robot.id)
    .bind(&robot.name)
    .bind(&robot.hostname)
    .bind(robot.status.as_str())
    .bind(&robot.environment)
    .bind(capabilities_to_json(&robot.capabilities))
    .bind(robot.max_concurrent_jobs as i32)
    .bind(Json(&robot.current_job_ids))
    .bind(Json(&robot.tags))
    .bind(Json(&robot.metrics))
    .bind(Json(&robot.assigned_workflows))
    .bind(robot.last_seen)
    .bind(robot.last_heartbeat)
    .bind(robot.created_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_by_id(&self, id: &str) -> Result<Option<Robot>, StoreError> {
    let row: Option<RobotRow> = sqlx::query_as(
      r#"
            SELECT id, name, hostname, status, environment, capabilities,
                   max_concurrent_jobs, current_job_ids, tags, metrics,
                   assigned_workflows, last_seen, last_heartbeat, created_at
            FROM robots
            WHERE id = $1
            "#,
    )
    .bind(id)
    .fetch_optional(&self.pool)
    .await?;

    Ok(row.map(Robot::from))
  }

  async fn get_by_hostname(&self, hostname: &str) -> Result<Option<Robot>, StoreError> {
    let row: Option<RobotRow> = sqlx::query_as(
      r#"
            SELECT id, name, hostname, status, environment, capabilities,
                   max_concurrent_jobs, current_job_ids, tags, metrics,
                   assigned_workflows, last_seen, last_heartbeat, created_at
            FROM robots
            WHERE hostname = $1
            "#,
    )
    .bind(hostname)
    .fetch_optional(&self.pool)
    .await?;

    Ok(row.map(Robot::from))
  }

  async fn get_all(&self) -> Result<Vec<Robot>, StoreError> {
    let rows: Vec<RobotRow> = sqlx::query_as(
      r#"
            SELECT id, name, hostname, status, environment, capabilities,
                   max_concurrent_jobs, current_job_ids, tags, metrics,
                   assigned_workflows, last_seen, last_heartbeat, created_at
            FROM robots
            ORDER BY id
            "#,
    )
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(Robot::from).collect())
  }

  async fn get_by_status(&self, status: RobotStatus) -> Result<Vec<Robot>, StoreError> {
    let rows: Vec<RobotRow> = sqlx::query_as(
      r#"
            SELECT id, name, hostname, status, environment, capabilities,
                   max_concurrent_jobs, current_job_ids, tags, metrics,
                   assigned_workflows, last_seen, last_heartbeat, created_at
            FROM robots
            WHERE status = $1
            ORDER BY id
            "#,
    )
    .bind(status.as_str())
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(Robot::from).collect())
  }

  async fn get_available(&self) -> Result<Vec<Robot>, StoreError> {
    let rows: Vec<RobotRow> = sqlx::query_as(
      r#"
            SELECT id, name, hostname, status, environment, capabilities,
                   max_concurrent_jobs, current_job_ids, tags, metrics,
                   assigned_workflows, last_seen, last_heartbeat, created_at
            FROM robots
            WHERE status = 'online'
              AND jsonb_array_length(current_job_ids) < max_concurrent_jobs
            ORDER BY id
            "#,
    )
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(Robot::from).collect())
  }

  async fn get_by_capabilities(
    &self,
    required: &HashSet<RobotCapability>,
  ) -> Result<Vec<Robot>, StoreError> {
    // An empty requirement matches every robot.
    if required.is_empty() {
      return self.get_all().await;
    }

    let rows: Vec<RobotRow> = sqlx::query_as(
      r#"
            SELECT id, name, hostname, status, environment, capabilities,
                   max_concurrent_jobs, current_job_ids, tags, metrics,
                   assigned_workflows, last_seen, last_heartbeat, created_at
            FROM robots
            WHERE capabilities @> $1
            ORDER BY id
            "#,
    )
    .bind(capabilities_to_json(required))
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(Robot::from).collect())
  }

  async fn update_heartbeat(&self, id: &str) -> Result<bool, StoreError> {
    // Offline robots come back online in the same statement.
    let result = sqlx::query(
      r#"
            UPDATE robots
            SET last_heartbeat = now(),
                last_seen = now(),
                status = CASE WHEN status = 'offline' THEN 'online' ELSE status END
            WHERE id = $1
            "#,
    )
    .bind(id)
    .execute(&self.pool)
    .await?;

    Ok(result.rows_affected() > 0)
  }

  async fn update_status(&self, id: &str, status: RobotStatus) -> Result<bool, StoreError> {
    let result = sqlx::query("UPDATE robots SET status = $2 WHERE id = $1")
      .bind(id)
      .bind(status.as_str())
      .execute(&self.pool)
      .await?;

    Ok(result.rows_affected() > 0)
  }

  async fn update_metrics(
    &self,
    id: &str,
    metrics: &HashMap<String, f64>,
  ) -> Result<bool, StoreError> {
    let result = sqlx::query("UPDATE robots SET metrics = $2 WHERE id = $1")
      .bind(id)
      .bind(Json(metrics))
      .execute(&self.pool)
      .await?;

    Ok(result.rows_affected() > 0)
  }

  async fn add_current_job(&self, id: &str, job_id: &str) -> Result<bool, StoreError> {
    // Single conditional UPDATE: the capacity check lives in the WHERE
    // clause and the status recompute in the SET, so concurrent adders
    // cannot push a robot past max_concurrent_jobs.
    let result = sqlx::query(
      r#"
            UPDATE robots
            SET current_job_ids = current_job_ids || to_jsonb($2::text),
                status = CASE
                    WHEN jsonb_array_length(current_job_ids) + 1 >= max_concurrent_jobs THEN 'busy'
                    ELSE 'online'
                END
            WHERE id = $1
              AND status IN ('online', 'busy')
              AND jsonb_array_length(current_job_ids) < max_concurrent_jobs
            "#,
    )
    .bind(id)
    .bind(job_id)
    .execute(&self.pool)
    .await?;

    Ok(result.rows_affected() > 0)
  }

  async fn remove_current_job(&self, id: &str, job_id: &str) -> Result<bool, StoreError> {
    // Offline/Error/Maintenance keep their status; Online/Busy recompute
    // from the post-removal count.
    let result = sqlx::query(
      r#"
            UPDATE robots
            SET current_job_ids = current_job_ids - $2::text,
                status = CASE
                    WHEN status NOT IN ('online', 'busy') THEN status
                    WHEN jsonb_array_length(current_job_ids - $2::text) >= max_concurrent_jobs THEN 'busy'
                    ELSE 'online'
                END
            WHERE id = $1
              AND current_job_ids @> to_jsonb($2::text)
            "#,
    )
    .bind(id)
    .bind(job_id)
    .execute(&self.pool)
    .await?;

    Ok(result.rows_affected() > 0)
  }

  async fn mark_stale_robots_offline(&self, timeout_seconds: i64) -> Result<u64, StoreError> {
    let result = sqlx::query(
      r#"
            UPDATE robots
            SET status = 'offline'
            WHERE status IN ('online', 'busy')
              AND last_heartbeat < now() - make_interval(secs => $1)
            "#,
    )
    .bind(timeout_seconds as f64)
    .execute(&self.pool)
    .await?;

    Ok(result.rows_affected())
  }

  async fn delete(&self, id: &str) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM robots WHERE id = $1")
      .bind(id)
      .execute(&self.pool)
      .await?;

    Ok(result.rows_affected() > 0)
  }
}
