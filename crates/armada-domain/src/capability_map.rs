use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::robot::RobotCapability;

/// Injected node-type → capability configuration.
///
/// Maps node-type identifiers (as they appear in a workflow graph) to the
/// capability tags a robot needs to execute them. Node types absent from
/// the map contribute no requirement. The default map is empty, which
/// means every robot qualifies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityMap {
  entries: HashMap<String, HashSet<RobotCapability>>,
}

impl CapabilityMap {
  pub fn new(entries: HashMap<String, HashSet<RobotCapability>>) -> Self {
    Self { entries }
  }

  pub fn insert(
    &mut self,
    node_type: impl Into<String>,
    capabilities: impl IntoIterator<Item = RobotCapability>,
  ) {
    self
      .entries
      .insert(node_type.into(), capabilities.into_iter().collect());
  }

  /// Union of the capability sets required by the given node types.
  pub fn required_for<'a, I>(&self, node_types: I) -> HashSet<RobotCapability>
  where
    I: IntoIterator<Item = &'a str>,
  {
    let mut required = HashSet::new();
    for node_type in node_types {
      if let Some(capabilities) = self.entries.get(node_type) {
        required.extend(capabilities.iter().copied());
      }
    }
    required
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_required_for_unions_mapped_types() {
    let mut map = CapabilityMap::default();
    map.insert("browser.open", [RobotCapability::Browser]);
    map.insert("excel.read", [RobotCapability::Office, RobotCapability::Desktop]);

    let required = map.required_for(["browser.open", "excel.read", "http.get"]);
    assert_eq!(
      required,
      HashSet::from([
        RobotCapability::Browser,
        RobotCapability::Office,
        RobotCapability::Desktop,
      ])
    );
  }

  #[test]
  fn test_empty_map_requires_nothing() {
    let map = CapabilityMap::default();
    assert!(map.required_for(["browser.open"]).is_empty());
  }
}
