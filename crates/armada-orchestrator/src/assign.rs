//! Assignment and override management.

use std::sync::Arc;

use tracing::{info, warn};

use armada_domain::{NodeRobotOverride, RobotAssignment, RobotCapability};
use armada_store::{AssignmentStore, OverrideStore, RobotStore};

use crate::error::OrchestratorError;

/// CRUD and validation for workflow-level robot assignments and
/// node-level routing overrides. Every validation failure happens before
/// any persistence side effect.
pub struct AssignRobotUseCase {
  robots: Arc<dyn RobotStore>,
  assignments: Arc<dyn AssignmentStore>,
  overrides: Arc<dyn OverrideStore>,
}

impl AssignRobotUseCase {
  pub fn new(
    robots: Arc<dyn RobotStore>,
    assignments: Arc<dyn AssignmentStore>,
    overrides: Arc<dyn OverrideStore>,
  ) -> Self {
    Self {
      robots,
      assignments,
      overrides,
    }
  }

  pub async fn assign_to_workflow(
    &self,
    workflow_id: &str,
    robot_id: &str,
    is_default: bool,
    priority: i32,
    notes: Option<String>,
  ) -> Result<RobotAssignment, OrchestratorError> {
    let workflow_id = non_blank(workflow_id, "workflow_id")?;
    let robot_id = non_blank(robot_id, "robot_id")?;
    self.require_robot(robot_id).await?;

    let mut assignment = RobotAssignment::new(workflow_id, robot_id);
    assignment.is_default = is_default;
    assignment.priority = priority;
    assignment.notes = notes;
    self.assignments.save(&assignment).await?;

    info!(workflow_id, robot_id, is_default, "robot assigned to workflow");
    Ok(assignment)
  }

  /// Create or replace a node-level override. At least one of `robot_id`
  /// or a usable capability set must be given; capability tokens the
  /// enumeration does not recognize are dropped with a warning.
  pub async fn assign_to_node(
    &self,
    workflow_id: &str,
    node_id: &str,
    robot_id: Option<&str>,
    required_capabilities: Option<&[String]>,
    reason: Option<String>,
  ) -> Result<NodeRobotOverride, OrchestratorError> {
    let workflow_id = non_blank(workflow_id, "workflow_id")?;
    let node_id = non_blank(node_id, "node_id")?;

    let (capabilities, unknown) =
      RobotCapability::parse_many(required_capabilities.unwrap_or_default());
    if !unknown.is_empty() {
      warn!(
        workflow_id,
        node_id,
        dropped = ?unknown,
        "ignoring unknown capability tokens"
      );
    }

    if robot_id.is_none() && capabilities.is_empty() {
      return Err(OrchestratorError::InvalidAssignment(
        "node override needs a robot_id or at least one recognized capability".to_string(),
      ));
    }

    if let Some(robot_id) = robot_id {
      self.require_robot(robot_id).await?;
    }

    let mut node_override = NodeRobotOverride::new(workflow_id, node_id);
    node_override.robot_id = robot_id.map(str::to_string);
    node_override.required_capabilities = capabilities;
    node_override.reason = reason;
    self.overrides.save(&node_override).await?;

    info!(workflow_id, node_id, "node override saved");
    Ok(node_override)
  }

  /// Returns whether a row was found and removed.
  pub async fn remove_workflow_assignment(
    &self,
    workflow_id: &str,
    robot_id: &str,
  ) -> Result<bool, OrchestratorError> {
    Ok(self.assignments.delete(workflow_id, robot_id).await?)
  }

  pub async fn remove_node_override(
    &self,
    workflow_id: &str,
    node_id: &str,
  ) -> Result<bool, OrchestratorError> {
    Ok(self.overrides.delete(workflow_id, node_id).await?)
  }

  /// Disable an override without losing its configuration.
  pub async fn deactivate_node_override(
    &self,
    workflow_id: &str,
    node_id: &str,
  ) -> Result<bool, OrchestratorError> {
    Ok(self.overrides.set_active(workflow_id, node_id, false).await?)
  }

  pub async fn activate_node_override(
    &self,
    workflow_id: &str,
    node_id: &str,
  ) -> Result<bool, OrchestratorError> {
    Ok(self.overrides.set_active(workflow_id, node_id, true).await?)
  }

  /// Make the robot the workflow's default, creating the assignment row
  /// when the pair has none yet.
  pub async fn set_default_robot(
    &self,
    workflow_id: &str,
    robot_id: &str,
  ) -> Result<(), OrchestratorError> {
    let workflow_id = non_blank(workflow_id, "workflow_id")?;
    let robot_id = non_blank(robot_id, "robot_id")?;
    self.require_robot(robot_id).await?;

    if self.assignments.get_by_key(workflow_id, robot_id).await?.is_some() {
      self.assignments.set_default(workflow_id, robot_id).await?;
    } else {
      let mut assignment = RobotAssignment::new(workflow_id, robot_id);
      assignment.is_default = true;
      self.assignments.save(&assignment).await?;
    }

    info!(workflow_id, robot_id, "default robot set");
    Ok(())
  }

  pub async fn get_workflow_assignments(
    &self,
    workflow_id: &str,
  ) -> Result<Vec<RobotAssignment>, OrchestratorError> {
    Ok(self.assignments.get_for_workflow(workflow_id).await?)
  }

  pub async fn get_node_overrides(
    &self,
    workflow_id: &str,
  ) -> Result<Vec<NodeRobotOverride>, OrchestratorError> {
    Ok(self.overrides.get_for_workflow(workflow_id).await?)
  }

  pub async fn get_active_node_overrides(
    &self,
    workflow_id: &str,
  ) -> Result<Vec<NodeRobotOverride>, OrchestratorError> {
    Ok(self.overrides.get_active_for_workflow(workflow_id).await?)
  }

  /// Bulk removal for robot decommissioning. Returns the count removed.
  pub async fn unassign_robot_from_all_workflows(
    &self,
    robot_id: &str,
  ) -> Result<u64, OrchestratorError> {
    let removed = self.assignments.delete_for_robot(robot_id).await?;
    info!(robot_id, removed, "workflow assignments removed for robot");
    Ok(removed)
  }

  pub async fn remove_all_node_overrides_for_robot(
    &self,
    robot_id: &str,
  ) -> Result<u64, OrchestratorError> {
    let removed = self.overrides.delete_for_robot(robot_id).await?;
    info!(robot_id, removed, "node overrides removed for robot");
    Ok(removed)
  }

  async fn require_robot(&self, robot_id: &str) -> Result<(), OrchestratorError> {
    match self.robots.get_by_id(robot_id).await? {
      Some(_) => Ok(()),
      None => Err(OrchestratorError::RobotNotFound(robot_id.to_string())),
    }
  }
}

fn non_blank<'a>(value: &'a str, field: &str) -> Result<&'a str, OrchestratorError> {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    return Err(OrchestratorError::InvalidAssignment(format!(
      "{field} must not be blank"
    )));
  }
  Ok(trimmed)
}
