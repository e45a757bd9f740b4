//! Job submission.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use armada_domain::{CapabilityMap, Job, JobPriority, Robot, RobotCapability, WorkflowDef};
use armada_store::{AssignmentStore, JobStore, RobotStore};

use crate::dispatcher::JobDispatcher;
use crate::error::OrchestratorError;
use crate::selection::RobotSelectionService;

/// Parameters for one submission.
pub struct SubmitJobRequest {
  pub workflow_id: String,
  /// Serialized node graph as submitted by the caller.
  pub workflow_data: Value,
  /// Explicit robot request; takes precedence over every other rule.
  pub robot_id: Option<String>,
  pub priority: JobPriority,
  /// Runtime variables merged (override wins) into the workflow's own.
  pub variables: Option<Map<String, Value>>,
  pub scheduled_time: Option<DateTime<Utc>>,
  /// Display name; falls back to the workflow metadata's name.
  pub workflow_name: Option<String>,
  pub created_by: Option<String>,
}

impl SubmitJobRequest {
  pub fn new(workflow_id: impl Into<String>, workflow_data: Value) -> Self {
    Self {
      workflow_id: workflow_id.into(),
      workflow_data,
      robot_id: None,
      priority: JobPriority::Normal,
      variables: None,
      scheduled_time: None,
      workflow_name: None,
      created_by: None,
    }
  }
}

/// Accepts a job, resolves its robot, persists it pending, and hands it
/// to the dispatcher for best-effort delivery.
pub struct SubmitJobUseCase {
  robots: Arc<dyn RobotStore>,
  jobs: Arc<dyn JobStore>,
  assignments: Arc<dyn AssignmentStore>,
  dispatcher: Arc<dyn JobDispatcher>,
  capability_map: CapabilityMap,
}

impl SubmitJobUseCase {
  pub fn new(
    robots: Arc<dyn RobotStore>,
    jobs: Arc<dyn JobStore>,
    assignments: Arc<dyn AssignmentStore>,
    dispatcher: Arc<dyn JobDispatcher>,
    capability_map: CapabilityMap,
  ) -> Self {
    Self {
      robots,
      jobs,
      assignments,
      dispatcher,
      capability_map,
    }
  }

  #[instrument(name = "submit_job", skip_all, fields(workflow_id = %request.workflow_id))]
  pub async fn execute(&self, request: SubmitJobRequest) -> Result<Job, OrchestratorError> {
    let workflow_id = request.workflow_id.trim().to_string();
    if workflow_id.is_empty() {
      return Err(OrchestratorError::InvalidAssignment(
        "workflow_id must not be blank".to_string(),
      ));
    }

    let mut workflow = WorkflowDef::from_value(request.workflow_data)?;
    let node_types = workflow.node_types();
    let required = self
      .capability_map
      .required_for(node_types.iter().map(String::as_str));

    let robot = self
      .resolve_robot(&workflow_id, request.robot_id.as_deref(), &required)
      .await?;

    if let Some(variables) = &request.variables {
      workflow.merge_variables(variables);
    }
    let workflow_json = workflow.to_json_string()?;

    let mut job = Job::new(
      Uuid::new_v4().to_string(),
      &workflow_id,
      &robot.id,
      workflow_json,
    );
    job.workflow_name = request.workflow_name.or_else(|| workflow.name.clone());
    job.robot_name = Some(robot.name.clone());
    job.priority = request.priority;
    job.scheduled_time = request.scheduled_time;
    job.environment = robot.environment.clone();
    job.created_by = request.created_by;

    // Persisted unconditionally: dispatch failure below must not undo the
    // accepted submission.
    self.jobs.save(&job).await?;
    info!(job_id = %job.id, robot_id = %robot.id, "job submitted");

    if let Err(error) = self.dispatcher.dispatch(&job).await {
      warn!(job_id = %job.id, error = %error, "dispatch failed, job left pending for claim polling");
    }

    Ok(job)
  }

  /// First matching rule wins: explicit robot, then workflow assignments
  /// (default first, then priority order), then auto-selection.
  async fn resolve_robot(
    &self,
    workflow_id: &str,
    explicit: Option<&str>,
    required: &HashSet<RobotCapability>,
  ) -> Result<Robot, OrchestratorError> {
    if let Some(robot_id) = explicit {
      let robot = self
        .robots
        .get_by_id(robot_id)
        .await?
        .ok_or_else(|| OrchestratorError::RobotNotFound(robot_id.to_string()))?;
      if !robot.is_available() {
        return Err(OrchestratorError::NoAvailableRobot(format!(
          "robot {robot_id} is not available"
        )));
      }
      return Ok(robot);
    }

    for assignment in self.assignments.get_for_workflow(workflow_id).await? {
      // Assigned robots that vanished, are unavailable, or no longer match
      // the workflow's requirements are skipped, not errors.
      let Some(robot) = self.robots.get_by_id(&assignment.robot_id).await? else {
        continue;
      };
      if robot.is_available() && robot.has_capabilities(required) {
        return Ok(robot);
      }
    }

    let available = self.robots.get_available().await?;
    RobotSelectionService::select(&available, required)
      .cloned()
      .ok_or_else(|| OrchestratorError::NoAvailableRobot("no available robots".to_string()))
  }
}
