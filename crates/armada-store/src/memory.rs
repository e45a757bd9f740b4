//! In-memory repositories.
//!
//! Backed by `tokio::sync::RwLock` maps; used by tests and embedded
//! callers. The claim and default-setting operations hold the write lock
//! across the whole read-then-update, which gives them the same atomicity
//! the PostgreSQL implementation gets from transactions and row locks.

use std::collections::HashMap;
use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use armada_domain::{
  Job, JobStatus, NodeRobotOverride, Robot, RobotAssignment, RobotCapability, RobotStatus,
};

use crate::{AssignmentStore, JobStore, OverrideStore, RobotStore, StoreError};

#[derive(Default)]
pub struct MemoryRobotStore {
  robots: RwLock<HashMap<String, Robot>>,
}

impl MemoryRobotStore {
  pub fn new() -> Self {
    Self::default()
  }
}

fn sorted_by_id(mut robots: Vec<Robot>) -> Vec<Robot> {
  robots.sort_by(|a, b| a.id.cmp(&b.id));
  robots
}

#[async_trait]
impl RobotStore for MemoryRobotStore {
  async fn save(&self, robot: &Robot) -> Result<(), StoreError> {
    self
      .robots
      .write()
      .await
      .insert(robot.id.clone(), robot.clone());
    Ok(())
  }

  async fn get_by_id(&self, id: &str) -> Result<Option<Robot>, StoreError> {
    Ok(self.robots.read().await.get(id).cloned())
  }

  async fn get_by_hostname(&self, hostname: &str) -> Result<Option<Robot>, StoreError> {
    Ok(
      self
        .robots
        .read()
        .await
        .values()
        .find(|r| r.hostname == hostname)
        .cloned(),
    )
  }

  async fn get_all(&self) -> Result<Vec<Robot>, StoreError> {
    Ok(sorted_by_id(
      self.robots.read().await.values().cloned().collect(),
    ))
  }

  async fn get_by_status(&self, status: RobotStatus) -> Result<Vec<Robot>, StoreError> {
    Ok(sorted_by_id(
      self
        .robots
        .read()
        .await
        .values()
        .filter(|r| r.status == status)
        .cloned()
        .collect(),
    ))
  }

  async fn get_available(&self) -> Result<Vec<Robot>, StoreError> {
    Ok(sorted_by_id(
      self
        .robots
        .read()
        .await
        .values()
        .filter(|r| r.is_available())
        .cloned()
        .collect(),
    ))
  }

  async fn get_by_capabilities(
    &self,
    required: &HashSet<RobotCapability>,
  ) -> Result<Vec<Robot>, StoreError> {
    Ok(sorted_by_id(
      self
        .robots
        .read()
        .await
        .values()
        .filter(|r| r.has_capabilities(required))
        .cloned()
        .collect(),
    ))
  }

  async fn update_heartbeat(&self, id: &str) -> Result<bool, StoreError> {
    let mut robots = self.robots.write().await;
    match robots.get_mut(id) {
      Some(robot) => {
        robot.heartbeat(Utc::now());
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn update_status(&self, id: &str, status: RobotStatus) -> Result<bool, StoreError> {
    let mut robots = self.robots.write().await;
    match robots.get_mut(id) {
      Some(robot) => {
        robot.status = status;
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn update_metrics(
    &self,
    id: &str,
    metrics: &HashMap<String, f64>,
  ) -> Result<bool, StoreError> {
    let mut robots = self.robots.write().await;
    match robots.get_mut(id) {
      Some(robot) => {
        robot.metrics = metrics.clone();
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn add_current_job(&self, id: &str, job_id: &str) -> Result<bool, StoreError> {
    let mut robots = self.robots.write().await;
    Ok(robots.get_mut(id).is_some_and(|r| r.add_job(job_id)))
  }

  async fn remove_current_job(&self, id: &str, job_id: &str) -> Result<bool, StoreError> {
    let mut robots = self.robots.write().await;
    Ok(robots.get_mut(id).is_some_and(|r| r.remove_job(job_id)))
  }

  async fn mark_stale_robots_offline(&self, timeout_seconds: i64) -> Result<u64, StoreError> {
    let cutoff = Utc::now() - Duration::seconds(timeout_seconds);
    let mut count = 0;
    let mut robots = self.robots.write().await;
    for robot in robots.values_mut() {
      if matches!(robot.status, RobotStatus::Online | RobotStatus::Busy)
        && robot.last_heartbeat < cutoff
      {
        robot.status = RobotStatus::Offline;
        count += 1;
      }
    }
    Ok(count)
  }

  async fn delete(&self, id: &str) -> Result<bool, StoreError> {
    Ok(self.robots.write().await.remove(id).is_some())
  }
}

#[derive(Default)]
pub struct MemoryJobStore {
  jobs: RwLock<HashMap<String, Job>>,
}

impl MemoryJobStore {
  pub fn new() -> Self {
    Self::default()
  }
}

/// Highest priority first, then oldest, then id for a stable order.
fn queue_order(a: &Job, b: &Job) -> std::cmp::Ordering {
  b.priority
    .rank()
    .cmp(&a.priority.rank())
    .then(a.created_at.cmp(&b.created_at))
    .then(a.id.cmp(&b.id))
}

#[async_trait]
impl JobStore for MemoryJobStore {
  async fn save(&self, job: &Job) -> Result<(), StoreError> {
    self.jobs.write().await.insert(job.id.clone(), job.clone());
    Ok(())
  }

  async fn get_by_id(&self, id: &str) -> Result<Option<Job>, StoreError> {
    Ok(self.jobs.read().await.get(id).cloned())
  }

  async fn get_by_robot(&self, robot_id: &str) -> Result<Vec<Job>, StoreError> {
    let mut jobs: Vec<Job> = self
      .jobs
      .read()
      .await
      .values()
      .filter(|j| j.robot_id == robot_id)
      .cloned()
      .collect();
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(jobs)
  }

  async fn get_by_workflow(&self, workflow_id: &str) -> Result<Vec<Job>, StoreError> {
    let mut jobs: Vec<Job> = self
      .jobs
      .read()
      .await
      .values()
      .filter(|j| j.workflow_id == workflow_id)
      .cloned()
      .collect();
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(jobs)
  }

  async fn get_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError> {
    let mut jobs: Vec<Job> = self
      .jobs
      .read()
      .await
      .values()
      .filter(|j| j.status == status)
      .cloned()
      .collect();
    jobs.sort_by(queue_order);
    Ok(jobs)
  }

  async fn get_pending_for_robot(&self, robot_id: &str) -> Result<Vec<Job>, StoreError> {
    let mut jobs: Vec<Job> = self
      .jobs
      .read()
      .await
      .values()
      .filter(|j| {
        j.robot_id == robot_id && matches!(j.status, JobStatus::Pending | JobStatus::Queued)
      })
      .cloned()
      .collect();
    jobs.sort_by(queue_order);
    Ok(jobs)
  }

  async fn claim_next_job(&self, robot_id: &str) -> Result<Option<Job>, StoreError> {
    // The write lock spans select and update, so two claimants can never
    // take the same job.
    let mut jobs = self.jobs.write().await;
    let now = Utc::now();

    let next_id = jobs
      .values()
      .filter(|j| {
        j.robot_id == robot_id
          && j.status == JobStatus::Pending
          && j.scheduled_time.is_none_or(|t| t <= now)
      })
      .min_by(|a, b| queue_order(a, b))
      .map(|j| j.id.clone());

    let Some(next_id) = next_id else {
      return Ok(None);
    };

    if let Some(job) = jobs.get_mut(&next_id) {
      job.status = JobStatus::Queued;
      return Ok(Some(job.clone()));
    }
    Ok(None)
  }

  async fn update_status(
    &self,
    id: &str,
    status: JobStatus,
    result: Option<&Map<String, Value>>,
    error_message: Option<&str>,
  ) -> Result<bool, StoreError> {
    let mut jobs = self.jobs.write().await;
    let Some(job) = jobs.get_mut(id) else {
      return Ok(false);
    };

    let now = Utc::now();
    job.status = status;
    if status == JobStatus::Running && job.started_at.is_none() {
      job.started_at = Some(now);
    }
    if status.is_terminal() {
      if job.completed_at.is_none() {
        job.completed_at = Some(now);
      }
      // Derived from the effective completion timestamp so duration_ms
      // always agrees with completed_at - started_at.
      if let Some(duration) = job.duration_millis() {
        job.duration_ms = Some(duration);
      }
    }
    if let Some(result) = result {
      job.result = result.clone();
    }
    if let Some(message) = error_message {
      job.error_message = Some(message.to_string());
    }
    Ok(true)
  }

  async fn update_progress(&self, id: &str, progress: i32) -> Result<bool, StoreError> {
    let mut jobs = self.jobs.write().await;
    match jobs.get_mut(id) {
      Some(job) => {
        job.progress = progress.clamp(0, 100) as u8;
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn update_current_node(&self, id: &str, node_id: &str) -> Result<bool, StoreError> {
    let mut jobs = self.jobs.write().await;
    match jobs.get_mut(id) {
      Some(job) => {
        job.current_node = Some(node_id.to_string());
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn append_logs(&self, id: &str, chunk: &str) -> Result<bool, StoreError> {
    let mut jobs = self.jobs.write().await;
    match jobs.get_mut(id) {
      Some(job) => {
        job.logs.push_str(chunk);
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn calculate_duration(&self, id: &str) -> Result<Option<i64>, StoreError> {
    let mut jobs = self.jobs.write().await;
    let Some(job) = jobs.get_mut(id) else {
      return Ok(None);
    };
    let duration = job.duration_millis();
    if duration.is_some() {
      job.duration_ms = duration;
    }
    Ok(duration)
  }

  async fn delete(&self, id: &str) -> Result<bool, StoreError> {
    Ok(self.jobs.write().await.remove(id).is_some())
  }

  async fn delete_old_jobs(&self, days: i64) -> Result<u64, StoreError> {
    let cutoff = Utc::now() - Duration::days(days);
    let mut jobs = self.jobs.write().await;
    let before = jobs.len();
    jobs.retain(|_, job| !(job.is_terminal() && job.created_at < cutoff));
    Ok((before - jobs.len()) as u64)
  }
}

#[derive(Default)]
pub struct MemoryAssignmentStore {
  assignments: RwLock<HashMap<(String, String), RobotAssignment>>,
}

impl MemoryAssignmentStore {
  pub fn new() -> Self {
    Self::default()
  }
}

fn assignment_order(a: &RobotAssignment, b: &RobotAssignment) -> std::cmp::Ordering {
  b.is_default
    .cmp(&a.is_default)
    .then(b.priority.cmp(&a.priority))
    .then(a.robot_id.cmp(&b.robot_id))
}

#[async_trait]
impl AssignmentStore for MemoryAssignmentStore {
  async fn save(&self, assignment: &RobotAssignment) -> Result<(), StoreError> {
    let mut assignments = self.assignments.write().await;
    if assignment.is_default {
      for (key, existing) in assignments.iter_mut() {
        if key.0 == assignment.workflow_id && key.1 != assignment.robot_id {
          existing.is_default = false;
        }
      }
    }
    assignments.insert(
      (assignment.workflow_id.clone(), assignment.robot_id.clone()),
      assignment.clone(),
    );
    Ok(())
  }

  async fn get_for_workflow(&self, workflow_id: &str) -> Result<Vec<RobotAssignment>, StoreError> {
    let mut result: Vec<RobotAssignment> = self
      .assignments
      .read()
      .await
      .values()
      .filter(|a| a.workflow_id == workflow_id)
      .cloned()
      .collect();
    result.sort_by(assignment_order);
    Ok(result)
  }

  async fn get_default_for_workflow(
    &self,
    workflow_id: &str,
  ) -> Result<Option<RobotAssignment>, StoreError> {
    Ok(
      self
        .assignments
        .read()
        .await
        .values()
        .find(|a| a.workflow_id == workflow_id && a.is_default)
        .cloned(),
    )
  }

  async fn get_by_key(
    &self,
    workflow_id: &str,
    robot_id: &str,
  ) -> Result<Option<RobotAssignment>, StoreError> {
    Ok(
      self
        .assignments
        .read()
        .await
        .get(&(workflow_id.to_string(), robot_id.to_string()))
        .cloned(),
    )
  }

  async fn set_default(&self, workflow_id: &str, robot_id: &str) -> Result<bool, StoreError> {
    let mut assignments = self.assignments.write().await;
    let key = (workflow_id.to_string(), robot_id.to_string());
    if !assignments.contains_key(&key) {
      return Ok(false);
    }
    for (existing_key, existing) in assignments.iter_mut() {
      if existing_key.0 == workflow_id {
        existing.is_default = existing_key == &key;
      }
    }
    Ok(true)
  }

  async fn delete(&self, workflow_id: &str, robot_id: &str) -> Result<bool, StoreError> {
    Ok(
      self
        .assignments
        .write()
        .await
        .remove(&(workflow_id.to_string(), robot_id.to_string()))
        .is_some(),
    )
  }

  async fn delete_for_robot(&self, robot_id: &str) -> Result<u64, StoreError> {
    let mut assignments = self.assignments.write().await;
    let before = assignments.len();
    assignments.retain(|key, _| key.1 != robot_id);
    Ok((before - assignments.len()) as u64)
  }
}

#[derive(Default)]
pub struct MemoryOverrideStore {
  overrides: RwLock<HashMap<(String, String), NodeRobotOverride>>,
}

impl MemoryOverrideStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl OverrideStore for MemoryOverrideStore {
  async fn save(&self, node_override: &NodeRobotOverride) -> Result<(), StoreError> {
    self.overrides.write().await.insert(
      (
        node_override.workflow_id.clone(),
        node_override.node_id.clone(),
      ),
      node_override.clone(),
    );
    Ok(())
  }

  async fn get_for_workflow(
    &self,
    workflow_id: &str,
  ) -> Result<Vec<NodeRobotOverride>, StoreError> {
    let mut result: Vec<NodeRobotOverride> = self
      .overrides
      .read()
      .await
      .values()
      .filter(|o| o.workflow_id == workflow_id)
      .cloned()
      .collect();
    result.sort_by(|a, b| a.node_id.cmp(&b.node_id));
    Ok(result)
  }

  async fn get_active_for_workflow(
    &self,
    workflow_id: &str,
  ) -> Result<Vec<NodeRobotOverride>, StoreError> {
    let mut result: Vec<NodeRobotOverride> = self
      .overrides
      .read()
      .await
      .values()
      .filter(|o| o.workflow_id == workflow_id && o.is_active)
      .cloned()
      .collect();
    result.sort_by(|a, b| a.node_id.cmp(&b.node_id));
    Ok(result)
  }

  async fn get_by_key(
    &self,
    workflow_id: &str,
    node_id: &str,
  ) -> Result<Option<NodeRobotOverride>, StoreError> {
    Ok(
      self
        .overrides
        .read()
        .await
        .get(&(workflow_id.to_string(), node_id.to_string()))
        .cloned(),
    )
  }

  async fn set_active(
    &self,
    workflow_id: &str,
    node_id: &str,
    active: bool,
  ) -> Result<bool, StoreError> {
    let mut overrides = self.overrides.write().await;
    match overrides.get_mut(&(workflow_id.to_string(), node_id.to_string())) {
      Some(node_override) => {
        node_override.is_active = active;
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn delete(&self, workflow_id: &str, node_id: &str) -> Result<bool, StoreError> {
    Ok(
      self
        .overrides
        .write()
        .await
        .remove(&(workflow_id.to_string(), node_id.to_string()))
        .is_some(),
    )
  }

  async fn delete_for_robot(&self, robot_id: &str) -> Result<u64, StoreError> {
    let mut overrides = self.overrides.write().await;
    let before = overrides.len();
    overrides.retain(|_, o| o.robot_id.as_deref() != Some(robot_id));
    Ok((before - overrides.len()) as u64)
  }
}
