//! Armada Store
//!
//! This crate provides the repository traits and implementations for the
//! orchestrator's persisted state: robots, jobs, workflow-level robot
//! assignments, and node-level routing overrides.
//!
//! Two implementations are provided:
//! - [`postgres`] — sqlx/PostgreSQL, the production backend. The atomic
//!   job-claim protocol relies on `FOR UPDATE SKIP LOCKED`, and all
//!   capacity/status-affecting mutations are single conditional UPDATE
//!   statements so concurrent writers never lose updates to each other.
//! - [`memory`] — tokio `RwLock` maps, for tests and embedded use.
//!
//! Domain types hold native sets/lists; encoding to the stored JSON
//! representation happens only inside the implementations here.

pub mod memory;
pub mod postgres;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use armada_domain::{
  Job, JobStatus, NodeRobotOverride, Robot, RobotAssignment, RobotCapability, RobotStatus,
};

/// Error type for storage operations. Absent rows are reported through
/// `Option`/`bool` returns rather than an error variant; JSON column
/// decode failures surface as [`sqlx::Error`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),
}

/// Repository for the robot fleet.
#[async_trait]
pub trait RobotStore: Send + Sync {
  /// Upsert a robot by id.
  async fn save(&self, robot: &Robot) -> Result<(), StoreError>;

  async fn get_by_id(&self, id: &str) -> Result<Option<Robot>, StoreError>;

  async fn get_by_hostname(&self, hostname: &str) -> Result<Option<Robot>, StoreError>;

  async fn get_all(&self) -> Result<Vec<Robot>, StoreError>;

  async fn get_by_status(&self, status: RobotStatus) -> Result<Vec<Robot>, StoreError>;

  /// Robots that are online and below capacity.
  async fn get_available(&self) -> Result<Vec<Robot>, StoreError>;

  /// Robots whose capability set contains every required capability.
  /// An empty requirement matches every robot.
  async fn get_by_capabilities(
    &self,
    required: &HashSet<RobotCapability>,
  ) -> Result<Vec<Robot>, StoreError>;

  async fn get_by_capability(&self, capability: RobotCapability) -> Result<Vec<Robot>, StoreError> {
    self.get_by_capabilities(&HashSet::from([capability])).await
  }

  /// Bump last_heartbeat/last_seen; an offline robot comes back online in
  /// the same statement. Returns false when the robot does not exist.
  async fn update_heartbeat(&self, id: &str) -> Result<bool, StoreError>;

  async fn update_status(&self, id: &str, status: RobotStatus) -> Result<bool, StoreError>;

  async fn update_metrics(
    &self,
    id: &str,
    metrics: &HashMap<String, f64>,
  ) -> Result<bool, StoreError>;

  /// Append a job id, refusing when the robot is at capacity or in a state
  /// that cannot take work. Online/Busy recomputes from the new count.
  async fn add_current_job(&self, id: &str, job_id: &str) -> Result<bool, StoreError>;

  /// Remove a job id. Online/Busy recomputes from the new count;
  /// Offline/Error/Maintenance statuses are left untouched.
  async fn remove_current_job(&self, id: &str, job_id: &str) -> Result<bool, StoreError>;

  /// Any online/busy robot whose last heartbeat is older than the timeout
  /// becomes offline. Returns the number of robots transitioned.
  async fn mark_stale_robots_offline(&self, timeout_seconds: i64) -> Result<u64, StoreError>;

  async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

/// Repository for jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
  /// Upsert a job by id.
  async fn save(&self, job: &Job) -> Result<(), StoreError>;

  async fn get_by_id(&self, id: &str) -> Result<Option<Job>, StoreError>;

  async fn get_by_robot(&self, robot_id: &str) -> Result<Vec<Job>, StoreError>;

  async fn get_by_workflow(&self, workflow_id: &str) -> Result<Vec<Job>, StoreError>;

  /// Jobs in the given status, highest priority first, oldest first within
  /// a priority.
  async fn get_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError>;

  /// Pending or queued jobs bound to one robot.
  async fn get_pending_for_robot(&self, robot_id: &str) -> Result<Vec<Job>, StoreError>;

  /// Atomically claim the highest-priority, oldest eligible pending job
  /// for this robot, transitioning it to queued. At most one claimant
  /// succeeds per job; a claimant never blocks on a row another claimant
  /// holds mid-transaction.
  async fn claim_next_job(&self, robot_id: &str) -> Result<Option<Job>, StoreError>;

  /// Transition a job's status. Entering running sets `started_at`;
  /// entering a terminal state sets `completed_at` and derives
  /// `duration_ms`. `result`/`error_message` overwrite only when given.
  async fn update_status(
    &self,
    id: &str,
    status: JobStatus,
    result: Option<&serde_json::Map<String, serde_json::Value>>,
    error_message: Option<&str>,
  ) -> Result<bool, StoreError>;

  /// Progress is clamped to [0, 100].
  async fn update_progress(&self, id: &str, progress: i32) -> Result<bool, StoreError>;

  async fn update_current_node(&self, id: &str, node_id: &str) -> Result<bool, StoreError>;

  /// Append to the job's log text (never replaces).
  async fn append_logs(&self, id: &str, chunk: &str) -> Result<bool, StoreError>;

  /// Derive and store `completed_at - started_at` in milliseconds.
  /// None when either timestamp is missing.
  async fn calculate_duration(&self, id: &str) -> Result<Option<i64>, StoreError>;

  async fn delete(&self, id: &str) -> Result<bool, StoreError>;

  /// Purge terminal jobs older than the retention window. Returns the
  /// number of jobs removed.
  async fn delete_old_jobs(&self, days: i64) -> Result<u64, StoreError>;
}

/// Repository for workflow-level robot assignments.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
  /// Upsert by `(workflow_id, robot_id)`. When the assignment is marked
  /// default, other defaults for the workflow are unset in the same
  /// transaction.
  async fn save(&self, assignment: &RobotAssignment) -> Result<(), StoreError>;

  /// Assignments for a workflow, default first, then priority descending.
  async fn get_for_workflow(&self, workflow_id: &str) -> Result<Vec<RobotAssignment>, StoreError>;

  async fn get_default_for_workflow(
    &self,
    workflow_id: &str,
  ) -> Result<Option<RobotAssignment>, StoreError>;

  async fn get_by_key(
    &self,
    workflow_id: &str,
    robot_id: &str,
  ) -> Result<Option<RobotAssignment>, StoreError>;

  /// Unset-then-set inside one transaction, scoped to the workflow, so the
  /// at-most-one-default invariant holds under concurrent callers.
  /// Returns false when no row exists for the pair.
  async fn set_default(&self, workflow_id: &str, robot_id: &str) -> Result<bool, StoreError>;

  async fn delete(&self, workflow_id: &str, robot_id: &str) -> Result<bool, StoreError>;

  /// Remove every assignment referencing the robot (decommissioning).
  async fn delete_for_robot(&self, robot_id: &str) -> Result<u64, StoreError>;
}

/// Repository for node-level routing overrides.
#[async_trait]
pub trait OverrideStore: Send + Sync {
  /// Upsert by `(workflow_id, node_id)`.
  async fn save(&self, node_override: &NodeRobotOverride) -> Result<(), StoreError>;

  async fn get_for_workflow(&self, workflow_id: &str)
  -> Result<Vec<NodeRobotOverride>, StoreError>;

  async fn get_active_for_workflow(
    &self,
    workflow_id: &str,
  ) -> Result<Vec<NodeRobotOverride>, StoreError>;

  async fn get_by_key(
    &self,
    workflow_id: &str,
    node_id: &str,
  ) -> Result<Option<NodeRobotOverride>, StoreError>;

  /// Flip `is_active` without deleting the configuration. Returns false
  /// when no row exists for the pair.
  async fn set_active(
    &self,
    workflow_id: &str,
    node_id: &str,
    active: bool,
  ) -> Result<bool, StoreError>;

  async fn delete(&self, workflow_id: &str, node_id: &str) -> Result<bool, StoreError>;

  /// Remove every override referencing the robot (decommissioning).
  async fn delete_for_robot(&self, robot_id: &str) -> Result<u64, StoreError>;
}
