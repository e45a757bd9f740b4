//! Fleet queries and statistics.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use armada_domain::{Robot, RobotCapability, RobotStatus};
use armada_store::{AssignmentStore, RobotStore};

use crate::error::OrchestratorError;

/// Fleet-wide capacity totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CapacityStatistics {
  pub total: u64,
  pub used: u64,
  pub available: u64,
}

/// Snapshot of the fleet for dashboards and operators.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FleetStatistics {
  pub total: usize,
  pub by_status: BTreeMap<String, usize>,
  pub capacity: CapacityStatistics,
  /// Percentage of total capacity in use; 0 for an empty fleet.
  pub utilization_percent: f64,
  pub by_capability: BTreeMap<String, usize>,
}

/// Read-side queries over the robot fleet.
pub struct ListRobotsUseCase {
  robots: Arc<dyn RobotStore>,
  assignments: Option<Arc<dyn AssignmentStore>>,
}

impl ListRobotsUseCase {
  pub fn new(robots: Arc<dyn RobotStore>) -> Self {
    Self {
      robots,
      assignments: None,
    }
  }

  /// Construct with assignment lookups enabled (`get_for_workflow`,
  /// `get_default_for_workflow`).
  pub fn with_assignments(
    robots: Arc<dyn RobotStore>,
    assignments: Arc<dyn AssignmentStore>,
  ) -> Self {
    Self {
      robots,
      assignments: Some(assignments),
    }
  }

  pub async fn get_all(&self) -> Result<Vec<Robot>, OrchestratorError> {
    Ok(self.robots.get_all().await?)
  }

  pub async fn get_available(&self) -> Result<Vec<Robot>, OrchestratorError> {
    Ok(self.robots.get_available().await?)
  }

  pub async fn get_online(&self) -> Result<Vec<Robot>, OrchestratorError> {
    Ok(self.robots.get_by_status(RobotStatus::Online).await?)
  }

  pub async fn get_offline(&self) -> Result<Vec<Robot>, OrchestratorError> {
    Ok(self.robots.get_by_status(RobotStatus::Offline).await?)
  }

  pub async fn get_busy(&self) -> Result<Vec<Robot>, OrchestratorError> {
    Ok(self.robots.get_by_status(RobotStatus::Busy).await?)
  }

  pub async fn get_by_capability(
    &self,
    capability: RobotCapability,
  ) -> Result<Vec<Robot>, OrchestratorError> {
    Ok(self.robots.get_by_capability(capability).await?)
  }

  pub async fn get_by_capabilities(
    &self,
    required: &HashSet<RobotCapability>,
  ) -> Result<Vec<Robot>, OrchestratorError> {
    Ok(self.robots.get_by_capabilities(required).await?)
  }

  pub async fn get_by_id(&self, id: &str) -> Result<Option<Robot>, OrchestratorError> {
    Ok(self.robots.get_by_id(id).await?)
  }

  pub async fn get_by_name(&self, name: &str) -> Result<Option<Robot>, OrchestratorError> {
    Ok(
      self
        .robots
        .get_all()
        .await?
        .into_iter()
        .find(|r| r.name == name),
    )
  }

  /// Robots with at least `min_capacity` free slots.
  pub async fn get_with_available_capacity(
    &self,
    min_capacity: usize,
  ) -> Result<Vec<Robot>, OrchestratorError> {
    Ok(
      self
        .robots
        .get_all()
        .await?
        .into_iter()
        .filter(|r| {
          (r.max_concurrent_jobs as usize).saturating_sub(r.current_job_count()) >= min_capacity
        })
        .collect(),
    )
  }

  /// Robots assigned to a workflow, in assignment order. An assignment
  /// whose robot no longer exists is silently skipped rather than failing
  /// the whole query.
  pub async fn get_for_workflow(
    &self,
    workflow_id: &str,
  ) -> Result<Vec<Robot>, OrchestratorError> {
    let assignments = self.require_assignments()?;
    let mut robots = Vec::new();
    for assignment in assignments.get_for_workflow(workflow_id).await? {
      if let Some(robot) = self.robots.get_by_id(&assignment.robot_id).await? {
        robots.push(robot);
      }
    }
    Ok(robots)
  }

  pub async fn get_default_for_workflow(
    &self,
    workflow_id: &str,
  ) -> Result<Option<Robot>, OrchestratorError> {
    let assignments = self.require_assignments()?;
    match assignments.get_default_for_workflow(workflow_id).await? {
      Some(assignment) => Ok(self.robots.get_by_id(&assignment.robot_id).await?),
      None => Ok(None),
    }
  }

  /// Case-insensitive substring match against name and tags. An empty
  /// query matches every robot.
  pub async fn search(&self, query: &str) -> Result<Vec<Robot>, OrchestratorError> {
    let needle = query.trim().to_lowercase();
    let robots = self.robots.get_all().await?;
    if needle.is_empty() {
      return Ok(robots);
    }
    Ok(
      robots
        .into_iter()
        .filter(|r| {
          r.name.to_lowercase().contains(&needle)
            || r.tags.iter().any(|t| t.to_lowercase().contains(&needle))
        })
        .collect(),
    )
  }

  pub async fn get_statistics(&self) -> Result<FleetStatistics, OrchestratorError> {
    let robots = self.robots.get_all().await?;

    let mut by_status: BTreeMap<String, usize> = RobotStatus::ALL
      .iter()
      .map(|s| (s.as_str().to_string(), 0))
      .collect();
    let mut by_capability: BTreeMap<String, usize> = BTreeMap::new();
    let mut capacity = CapacityStatistics::default();

    for robot in &robots {
      if let Some(count) = by_status.get_mut(robot.status.as_str()) {
        *count += 1;
      }
      for capability in &robot.capabilities {
        *by_capability.entry(capability.as_str().to_string()).or_insert(0) += 1;
      }
      capacity.total += robot.max_concurrent_jobs as u64;
      capacity.used += robot.current_job_count() as u64;
    }
    capacity.available = capacity.total.saturating_sub(capacity.used);

    let utilization_percent = if capacity.total == 0 {
      0.0
    } else {
      capacity.used as f64 / capacity.total as f64 * 100.0
    };

    Ok(FleetStatistics {
      total: robots.len(),
      by_status,
      capacity,
      utilization_percent,
      by_capability,
    })
  }

  fn require_assignments(&self) -> Result<&Arc<dyn AssignmentStore>, OrchestratorError> {
    self.assignments.as_ref().ok_or_else(|| {
      OrchestratorError::Configuration(
        "workflow lookups need an assignment store; construct with with_assignments".to_string(),
      )
    })
  }
}
