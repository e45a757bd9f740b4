use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A workflow-level routing preference, keyed by `(workflow_id, robot_id)`.
///
/// At most one assignment per workflow carries `is_default = true`; the
/// store maintains that invariant transactionally. Among non-default
/// candidates, higher `priority` wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotAssignment {
  pub workflow_id: String,
  pub robot_id: String,
  #[serde(default)]
  pub is_default: bool,
  #[serde(default)]
  pub priority: i32,
  pub created_at: DateTime<Utc>,
  #[serde(default)]
  pub created_by: Option<String>,
  #[serde(default)]
  pub notes: Option<String>,
}

impl RobotAssignment {
  pub fn new(workflow_id: impl Into<String>, robot_id: impl Into<String>) -> Self {
    Self {
      workflow_id: workflow_id.into(),
      robot_id: robot_id.into(),
      is_default: false,
      priority: 0,
      created_at: Utc::now(),
      created_by: None,
      notes: None,
    }
  }
}
