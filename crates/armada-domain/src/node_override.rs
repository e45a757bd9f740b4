use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::robot::RobotCapability;

/// A node-level routing rule, keyed by `(workflow_id, node_id)`.
///
/// Targets either a specific robot (`robot_id`) or any robot carrying the
/// `required_capabilities`; at least one of the two must be populated.
/// `is_active` soft-disables the rule without losing its configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRobotOverride {
  pub workflow_id: String,
  pub node_id: String,
  #[serde(default)]
  pub robot_id: Option<String>,
  #[serde(default)]
  pub required_capabilities: HashSet<RobotCapability>,
  #[serde(default)]
  pub reason: Option<String>,
  #[serde(default)]
  pub created_by: Option<String>,
  pub created_at: DateTime<Utc>,
  #[serde(default = "default_active")]
  pub is_active: bool,
}

fn default_active() -> bool {
  true
}

impl NodeRobotOverride {
  pub fn new(workflow_id: impl Into<String>, node_id: impl Into<String>) -> Self {
    Self {
      workflow_id: workflow_id.into(),
      node_id: node_id.into(),
      robot_id: None,
      required_capabilities: HashSet::new(),
      reason: None,
      created_by: None,
      created_at: Utc::now(),
      is_active: true,
    }
  }

  /// Whether the override targets anything at all.
  pub fn has_target(&self) -> bool {
    self.robot_id.is_some() || !self.required_capabilities.is_empty()
  }
}
