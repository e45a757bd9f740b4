//! Row structs: the serialization boundary between domain types and the
//! stored representation (JSONB sets/lists, snake_case text enums).
//!
//! Decoding is lossy on purpose: unknown status/priority/capability
//! strings from legacy rows degrade to defaults instead of failing the
//! whole query.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::FromRow;
use sqlx::types::Json;

use armada_domain::{
  Job, JobPriority, JobStatus, NodeRobotOverride, Robot, RobotAssignment, RobotCapability,
  RobotStatus,
};

pub(crate) fn capabilities_to_json(capabilities: &std::collections::HashSet<RobotCapability>) -> Value {
  let mut tokens: Vec<&'static str> = capabilities.iter().map(|c| c.as_str()).collect();
  tokens.sort_unstable();
  Value::from(tokens)
}

#[derive(FromRow)]
pub(crate) struct RobotRow {
  pub id: String,
  pub name: String,
  pub hostname: String,
  pub status: String,
  pub environment: Option<String>,
  pub capabilities: Json<Vec<String>>,
  pub max_concurrent_jobs: i32,
  pub current_job_ids: Json<Vec<String>>,
  pub tags: Json<Vec<String>>,
  pub metrics: Json<HashMap<String, f64>>,
  pub assigned_workflows: Json<Vec<String>>,
  pub last_seen: DateTime<Utc>,
  pub last_heartbeat: DateTime<Utc>,
  pub created_at: DateTime<Utc>,
}

impl From<RobotRow> for Robot {
  fn from(row: RobotRow) -> Self {
    let (capabilities, _unknown) = RobotCapability::parse_many(&row.capabilities.0);
    Robot {
      id: row.id,
      name: row.name,
      hostname: row.hostname,
      status: RobotStatus::from_str_lossy(&row.status),
      environment: row.environment,
      capabilities,
      max_concurrent_jobs: row.max_concurrent_jobs.max(1) as u32,
      current_job_ids: row.current_job_ids.0,
      tags: row.tags.0,
      metrics: row.metrics.0,
      assigned_workflows: row.assigned_workflows.0,
      last_seen: row.last_seen,
      last_heartbeat: row.last_heartbeat,
      created_at: row.created_at,
    }
  }
}

#[derive(FromRow)]
pub(crate) struct JobRow {
  pub id: String,
  pub workflow_id: String,
  pub workflow_name: Option<String>,
  pub robot_id: String,
  pub robot_name: Option<String>,
  pub status: String,
  pub priority: String,
  pub environment: Option<String>,
  pub workflow_json: String,
  pub scheduled_time: Option<DateTime<Utc>>,
  pub started_at: Option<DateTime<Utc>>,
  pub completed_at: Option<DateTime<Utc>>,
  pub duration_ms: Option<i64>,
  pub progress: i32,
  pub current_node: Option<String>,
  pub result: Json<Map<String, Value>>,
  pub logs: String,
  pub error_message: Option<String>,
  pub created_at: DateTime<Utc>,
  pub created_by: Option<String>,
}

impl From<JobRow> for Job {
  fn from(row: JobRow) -> Self {
    Job {
      id: row.id,
      workflow_id: row.workflow_id,
      workflow_name: row.workflow_name,
      robot_id: row.robot_id,
      robot_name: row.robot_name,
      status: JobStatus::from_str_lossy(&row.status),
      priority: JobPriority::from_str_lossy(&row.priority),
      environment: row.environment,
      workflow_json: row.workflow_json,
      scheduled_time: row.scheduled_time,
      started_at: row.started_at,
      completed_at: row.completed_at,
      duration_ms: row.duration_ms,
      progress: row.progress.clamp(0, 100) as u8,
      current_node: row.current_node,
      result: row.result.0,
      logs: row.logs,
      error_message: row.error_message,
      created_at: row.created_at,
      created_by: row.created_by,
    }
  }
}

#[derive(FromRow)]
pub(crate) struct AssignmentRow {
  pub workflow_id: String,
  pub robot_id: String,
  pub is_default: bool,
  pub priority: i32,
  pub created_at: DateTime<Utc>,
  pub created_by: Option<String>,
  pub notes: Option<String>,
}

impl From<AssignmentRow> for RobotAssignment {
  fn from(row: AssignmentRow) -> Self {
    RobotAssignment {
      workflow_id: row.workflow_id,
      robot_id: row.robot_id,
      is_default: row.is_default,
      priority: row.priority,
      created_at: row.created_at,
      created_by: row.created_by,
      notes: row.notes,
    }
  }
}

#[derive(FromRow)]
pub(crate) struct OverrideRow {
  pub workflow_id: String,
  pub node_id: String,
  pub robot_id: Option<String>,
  pub required_capabilities: Json<Vec<String>>,
  pub reason: Option<String>,
  pub created_by: Option<String>,
  pub created_at: DateTime<Utc>,
  pub is_active: bool,
}

impl From<OverrideRow> for NodeRobotOverride {
  fn from(row: OverrideRow) -> Self {
    let (required_capabilities, _unknown) =
      RobotCapability::parse_many(&row.required_capabilities.0);
    NodeRobotOverride {
      workflow_id: row.workflow_id,
      node_id: row.node_id,
      robot_id: row.robot_id,
      required_capabilities,
      reason: row.reason,
      created_by: row.created_by,
      created_at: row.created_at,
      is_active: row.is_active,
    }
  }
}
