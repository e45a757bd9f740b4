use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DomainError;

/// A node in a submitted workflow graph.
///
/// Only the fields the orchestrator inspects are typed; everything else
/// rides along in `extra` and survives the round trip to `workflow_json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  pub node_id: String,
  /// Wire key is `type`; `node_type` is accepted as an input alias.
  #[serde(rename = "type", alias = "node_type")]
  pub node_type: String,
  #[serde(default, flatten)]
  pub extra: Map<String, Value>,
}

/// A workflow definition as submitted by a caller.
///
/// The orchestrator never executes the graph; it inspects node types to
/// derive capability requirements and merges runtime variables before
/// serializing the definition onto the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
  #[serde(default)]
  pub workflow_id: Option<String>,
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub nodes: Vec<NodeDef>,
  #[serde(default)]
  pub variables: Map<String, Value>,
  #[serde(default, flatten)]
  pub extra: Map<String, Value>,
}

impl WorkflowDef {
  pub fn from_value(value: Value) -> Result<Self, DomainError> {
    Ok(serde_json::from_value(value)?)
  }

  /// Distinct node-type identifiers present in the graph, in stable order.
  pub fn node_types(&self) -> BTreeSet<String> {
    self.nodes.iter().map(|n| n.node_type.clone()).collect()
  }

  /// Merge runtime variables into the definition's variable map.
  /// Overrides win on key collision; unrelated keys are preserved.
  pub fn merge_variables(&mut self, overrides: &Map<String, Value>) {
    for (key, value) in overrides {
      self.variables.insert(key.clone(), value.clone());
    }
  }

  pub fn to_json_string(&self) -> Result<String, DomainError> {
    Ok(serde_json::to_string(self)?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_node_types_are_distinct_and_ordered() {
    let workflow = WorkflowDef::from_value(json!({
      "name": "invoice-sync",
      "nodes": [
        {"node_id": "n1", "type": "browser.open"},
        {"node_id": "n2", "type": "excel.read"},
        {"node_id": "n3", "type": "browser.open"},
      ],
    }))
    .unwrap();
    let types: Vec<_> = workflow.node_types().into_iter().collect();
    assert_eq!(types, vec!["browser.open".to_string(), "excel.read".to_string()]);
  }

  #[test]
  fn test_merge_variables_override_wins() {
    let mut workflow = WorkflowDef::from_value(json!({
      "nodes": [],
      "variables": {"region": "eu", "retries": 3},
    }))
    .unwrap();
    let overrides = json!({"region": "us"});
    workflow.merge_variables(overrides.as_object().unwrap());
    assert_eq!(workflow.variables["region"], json!("us"));
    assert_eq!(workflow.variables["retries"], json!(3));
  }

  #[test]
  fn test_node_type_key_shape_survives_round_trip() {
    let workflow = WorkflowDef::from_value(json!({
      "nodes": [{"node_id": "n1", "type": "browser.open"}],
    }))
    .unwrap();
    let serialized: Value = serde_json::from_str(&workflow.to_json_string().unwrap()).unwrap();
    assert_eq!(serialized["nodes"][0]["type"], json!("browser.open"));
    assert!(serialized["nodes"][0].get("node_type").is_none());
  }

  #[test]
  fn test_unknown_fields_survive_round_trip() {
    let workflow = WorkflowDef::from_value(json!({
      "name": "wf",
      "nodes": [],
      "layout": {"zoom": 1.5},
    }))
    .unwrap();
    let serialized: Value = serde_json::from_str(&workflow.to_json_string().unwrap()).unwrap();
    assert_eq!(serialized["layout"]["zoom"], json!(1.5));
  }
}
