use async_trait::async_trait;
use sqlx::PgPool;

use armada_domain::NodeRobotOverride;

use crate::{OverrideStore, StoreError};

use super::rows::{OverrideRow, capabilities_to_json};

/// PostgreSQL-backed node-override repository.
pub struct PgOverrideStore {
  pool: PgPool,
}

impl PgOverrideStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl OverrideStore for PgOverrideStore {
  async fn save(&self, node_override: &NodeRobotOverride) -> Result<(), StoreError> {
    sqlx::query(
      r#"
            INSERT INTO node_robot_overrides (
                workflow_id, node_id, robot_id, required_capabilities,
                reason, created_by, created_at, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (workflow_id, node_id) DO UPDATE SET
                robot_id = EXCLUDED.robot_id,
                required_capabilities = EXCLUDED.required_capabilities,
                reason = EXCLUDED.reason,
                created_by = EXCLUDED.created_by,
                is_active = EXCLUDED.is_active
            "#,
    )
    .bind(&node_override.workflow_id)
    .bind(&node_override.node_id)
    .bind(&node_override.robot_id)
    .bind(capabilities_to_json(&node_override.required_capabilities))
    .bind(&node_override.reason)
    .bind(&node_override.created_by)
    .bind(node_override.created_at)
    .bind(node_override.is_active)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_for_workflow(
    &self,
    workflow_id: &str,
  ) -> Result<Vec<NodeRobotOverride>, StoreError> {
    let rows: Vec<OverrideRow> = sqlx::query_as(
      r#"
            SELECT workflow_id, node_id, robot_id, required_capabilities,
                   reason, created_by, created_at, is_active
            FROM node_robot_overrides
            WHERE workflow_id = $1
            ORDER BY node_id
            "#,
    )
    .bind(workflow_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(NodeRobotOverride::from).collect())
  }

  async fn get_active_for_workflow(
    &self,
    workflow_id: &str,
  ) -> Result<Vec<NodeRobotOverride>, StoreError> {
    let rows: Vec<OverrideRow> = sqlx::query_as(
      r#"
            SELECT workflow_id, node_id, robot_id, required_capabilities,
                   reason, created_by, created_at, is_active
            FROM node_robot_overrides
            WHERE workflow_id = $1 AND is_active = TRUE
            ORDER BY node_id
            "#,
    )
    .bind(workflow_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(NodeRobotOverride::from).collect())
  }

  async fn get_by_key(
    &self,
    workflow_id: &str,
    node_id: &str,
  ) -> Result<Option<NodeRobotOverride>, StoreError> {
    let row: Option<OverrideRow> = sqlx::query_as(
      r#"
            SELECT workflow_id, node_id, robot_id, required_capabilities,
                   reason, created_by, created_at, is_active
            FROM node_robot_overrides
            WHERE workflow_id = $1 AND node_id = $2
            "#,
    )
    .bind(workflow_id)
    .bind(node_id)
    .fetch_optional(&self.pool)
    .await?;

    Ok(row.map(NodeRobotOverride::from))
  }

  async fn set_active(
    &self,
    workflow_id: &str,
    node_id: &str,
    active: bool,
  ) -> Result<bool, StoreError> {
    let result = sqlx::query(
      r#"
            UPDATE node_robot_overrides
            SET is_active = $3
            WHERE workflow_id = $1 AND node_id = $2
            "#,
    )
    .bind(workflow_id)
    .bind(node_id)
    .bind(active)
    .execute(&self.pool)
    .await?;

    Ok(result.rows_affected() > 0)
  }

  async fn delete(&self, workflow_id: &str, node_id: &str) -> Result<bool, StoreError> {
    let result = sqlx::query(
      "DELETE FROM node_robot_overrides WHERE workflow_id = $1 AND node_id = $2",
    )
    .bind(workflow_id)
    .bind(node_id)
    .execute(&self.pool)
    .await?;

    Ok(result.rows_affected() > 0)
  }

  async fn delete_for_robot(&self, robot_id: &str) -> Result<u64, StoreError> {
    let result = sqlx::query("DELETE FROM node_robot_overrides WHERE robot_id = $1")
      .bind(robot_id)
      .execute(&self.pool)
      .await?;

    Ok(result.rows_affected())
  }
}
