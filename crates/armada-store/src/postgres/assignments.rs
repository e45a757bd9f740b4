use async_trait::async_trait;
use sqlx::PgPool;

use armada_domain::RobotAssignment;

use crate::{AssignmentStore, StoreError};

use super::rows::AssignmentRow;

/// PostgreSQL-backed workflow-assignment repository.
pub struct PgAssignmentStore {
  pool: PgPool,
}

impl PgAssignmentStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl AssignmentStore for PgAssignmentStore {
  async fn save(&self, assignment: &RobotAssignment) -> Result<(), StoreError> {
    let mut tx = self.pool.begin().await?;

    // Unsetting other defaults and writing the new row commit together,
    // keeping at most one default per workflow.
    if assignment.is_default {
      sqlx::query(
        r#"
                UPDATE workflow_robot_assignments
                SET is_default = FALSE
                WHERE workflow_id = $1 AND robot_id <> $2
                "#,
      )
      .bind(&assignment.workflow_id)
      .bind(&assignment.robot_id)
      .execute(&mut *tx)
      .await?;
    }

    sqlx::query(
      r#"
            INSERT INTO workflow_robot_assignments (
                workflow_id, robot_id, is_default, priority,
                created_at, created_by, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (workflow_id, robot_id) DO UPDATE SET
                is_default = EXCLUDED.is_default,
                priority = EXCLUDED.priority,
                created_by = EXCLUDED.created_by,
                notes = EXCLUDED.notes
            "#,
    )
    .bind(&assignment.workflow_id)
    .bind(&assignment.robot_id)
    .bind(assignment.is_default)
    .bind(assignment.priority)
    .bind(assignment.created_at)
    .bind(&assignment.created_by)
    .bind(&assignment.notes)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
  }

  async fn get_for_workflow(&self, workflow_id: &str) -> Result<Vec<RobotAssignment>, StoreError> {
    let rows: Vec<AssignmentRow> = sqlx::query_as(
      r#"
            SELECT workflow_id, robot_id, is_default, priority,
                   created_at, created_by, notes
            FROM workflow_robot_assignments
            WHERE workflow_id = $1
            ORDER BY is_default DESC, priority DESC, robot_id ASC
            "#,
    )
    .bind(workflow_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(RobotAssignment::from).collect())
  }

  async fn get_default_for_workflow(
    &self,
    workflow_id: &str,
  ) -> Result<Option<RobotAssignment>, StoreError> {
    let row: Option<AssignmentRow> = sqlx::query_as(
      r#"
            SELECT workflow_id, robot_id, is_default, priority,
                   created_at, created_by, notes
            FROM workflow_robot_assignments
            WHERE workflow_id = $1 AND is_default = TRUE
            "#,
    )
    .bind(workflow_id)
    .fetch_optional(&self.pool)
    .await?;

    Ok(row.map(RobotAssignment::from))
  }

  async fn get_by_key(
    &self,
    workflow_id: &str,
    robot_id: &str,
  ) -> Result<Option<RobotAssignment>, StoreError> {
    let row: Option<AssignmentRow> = sqlx::query_as(
      r#"
            SELECT workflow_id, robot_id, is_default, priority,
                   created_at, created_by, notes
            FROM workflow_robot_assignments
            WHERE workflow_id = $1 AND robot_id = $2
            "#,
    )
    .bind(workflow_id)
    .bind(robot_id)
    .fetch_optional(&self.pool)
    .await?;

    Ok(row.map(RobotAssignment::from))
  }

  async fn set_default(&self, workflow_id: &str, robot_id: &str) -> Result<bool, StoreError> {
    let mut tx = self.pool.begin().await?;

    sqlx::query(
      "UPDATE workflow_robot_assignments SET is_default = FALSE WHERE workflow_id = $1",
    )
    .bind(workflow_id)
    .execute(&mut *tx)
    .await?;

    let result = sqlx::query(
      r#"
            UPDATE workflow_robot_assignments
            SET is_default = TRUE
            WHERE workflow_id = $1 AND robot_id = $2
            "#,
    )
    .bind(workflow_id)
    .bind(robot_id)
    .execute(&mut *tx)
    .await?;

    // No row for the pair: roll the unset back so the previous default
    // survives.
    if result.rows_affected() == 0 {
      tx.rollback().await?;
      return Ok(false);
    }

    tx.commit().await?;
    Ok(true)
  }

  async fn delete(&self, workflow_id: &str, robot_id: &str) -> Result<bool, StoreError> {
    let result = sqlx::query(
      "DELETE FROM workflow_robot_assignments WHERE workflow_id = $1 AND robot_id = $2",
    )
    .bind(workflow_id)
    .bind(robot_id)
    .execute(&self.pool)
    .await?;

    Ok(result.rows_affected() > 0)
  }

  async fn delete_for_robot(&self, robot_id: &str) -> Result<u64, StoreError> {
    let result = sqlx::query("DELETE FROM workflow_robot_assignments WHERE robot_id = $1")
      .bind(robot_id)
      .execute(&self.pool)
      .await?;

    Ok(result.rows_affected())
  }
}
