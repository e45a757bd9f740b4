use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotStatus {
  Online,
  Offline,
  Busy,
  Error,
  Maintenance,
}

impl RobotStatus {
  pub const ALL: [RobotStatus; 5] = [
    RobotStatus::Online,
    RobotStatus::Offline,
    RobotStatus::Busy,
    RobotStatus::Error,
    RobotStatus::Maintenance,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      RobotStatus::Online => "online",
      RobotStatus::Offline => "offline",
      RobotStatus::Busy => "busy",
      RobotStatus::Error => "error",
      RobotStatus::Maintenance => "maintenance",
    }
  }

  /// Parse a stored status string. Unknown values decode as `Offline`
  /// so a legacy row never fails the whole query.
  pub fn from_str_lossy(s: &str) -> Self {
    match s {
      "online" => RobotStatus::Online,
      "busy" => RobotStatus::Busy,
      "error" => RobotStatus::Error,
      "maintenance" => RobotStatus::Maintenance,
      _ => RobotStatus::Offline,
    }
  }
}

/// An enumerated tag describing what a robot can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotCapability {
  Browser,
  Desktop,
  Gpu,
  HighMemory,
  Network,
  Database,
  Email,
  Office,
}

impl RobotCapability {
  pub const ALL: [RobotCapability; 8] = [
    RobotCapability::Browser,
    RobotCapability::Desktop,
    RobotCapability::Gpu,
    RobotCapability::HighMemory,
    RobotCapability::Network,
    RobotCapability::Database,
    RobotCapability::Email,
    RobotCapability::Office,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      RobotCapability::Browser => "browser",
      RobotCapability::Desktop => "desktop",
      RobotCapability::Gpu => "gpu",
      RobotCapability::HighMemory => "high_memory",
      RobotCapability::Network => "network",
      RobotCapability::Database => "database",
      RobotCapability::Email => "email",
      RobotCapability::Office => "office",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "browser" => Some(RobotCapability::Browser),
      "desktop" => Some(RobotCapability::Desktop),
      "gpu" => Some(RobotCapability::Gpu),
      "high_memory" => Some(RobotCapability::HighMemory),
      "network" => Some(RobotCapability::Network),
      "database" => Some(RobotCapability::Database),
      "email" => Some(RobotCapability::Email),
      "office" => Some(RobotCapability::Office),
      _ => None,
    }
  }

  /// Partition a list of capability tokens into the recognized set and the
  /// unrecognized leftovers, so the caller can warn about the leftovers.
  pub fn parse_many<I, S>(tokens: I) -> (HashSet<RobotCapability>, Vec<String>)
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let mut known = HashSet::new();
    let mut unknown = Vec::new();
    for token in tokens {
      match RobotCapability::parse(token.as_ref()) {
        Some(cap) => {
          known.insert(cap);
        }
        None => unknown.push(token.as_ref().to_string()),
      }
    }
    (known, unknown)
  }
}

/// A worker process capable of executing jobs.
///
/// Capacity is bounded: `current_job_ids.len() <= max_concurrent_jobs`
/// holds after every mutation, and the Online/Busy status flips as a side
/// effect of job-count changes rather than being set independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Robot {
  pub id: String,
  pub name: String,
  pub hostname: String,
  pub status: RobotStatus,
  #[serde(default)]
  pub environment: Option<String>,
  #[serde(default)]
  pub capabilities: HashSet<RobotCapability>,
  pub max_concurrent_jobs: u32,
  #[serde(default)]
  pub current_job_ids: Vec<String>,
  #[serde(default)]
  pub tags: Vec<String>,
  #[serde(default)]
  pub metrics: HashMap<String, f64>,
  #[serde(default)]
  pub assigned_workflows: Vec<String>,
  pub last_seen: DateTime<Utc>,
  pub last_heartbeat: DateTime<Utc>,
  pub created_at: DateTime<Utc>,
}

impl Robot {
  pub fn new(id: impl Into<String>, name: impl Into<String>, hostname: impl Into<String>) -> Self {
    let now = Utc::now();
    Self {
      id: id.into(),
      name: name.into(),
      hostname: hostname.into(),
      status: RobotStatus::Offline,
      environment: None,
      capabilities: HashSet::new(),
      max_concurrent_jobs: 1,
      current_job_ids: Vec::new(),
      tags: Vec::new(),
      metrics: HashMap::new(),
      assigned_workflows: Vec::new(),
      last_seen: now,
      last_heartbeat: now,
      created_at: now,
    }
  }

  pub fn current_job_count(&self) -> usize {
    self.current_job_ids.len()
  }

  pub fn at_capacity(&self) -> bool {
    self.current_job_ids.len() >= self.max_concurrent_jobs as usize
  }

  /// A robot can accept work when it is online and below capacity.
  pub fn is_available(&self) -> bool {
    self.status == RobotStatus::Online && !self.at_capacity()
  }

  /// Superset test: an empty requirement is always satisfied.
  pub fn has_capabilities(&self, required: &HashSet<RobotCapability>) -> bool {
    required.is_subset(&self.capabilities)
  }

  /// Append a job id, enforcing the capacity bound. Returns false (and
  /// leaves the robot untouched) when at capacity or when the robot is in
  /// a state that cannot take work.
  pub fn add_job(&mut self, job_id: impl Into<String>) -> bool {
    if self.at_capacity() {
      return false;
    }
    if matches!(
      self.status,
      RobotStatus::Offline | RobotStatus::Error | RobotStatus::Maintenance
    ) {
      return false;
    }
    self.current_job_ids.push(job_id.into());
    self.recompute_status();
    true
  }

  /// Remove a job id. Returns false when the id was not present.
  pub fn remove_job(&mut self, job_id: &str) -> bool {
    let before = self.current_job_ids.len();
    self.current_job_ids.retain(|id| id != job_id);
    if self.current_job_ids.len() == before {
      return false;
    }
    self.recompute_status();
    true
  }

  /// Online <-> Busy flips with capacity; Offline/Error/Maintenance are
  /// never changed by job-count mutations.
  fn recompute_status(&mut self) {
    match self.status {
      RobotStatus::Online | RobotStatus::Busy => {
        self.status = if self.at_capacity() {
          RobotStatus::Busy
        } else {
          RobotStatus::Online
        };
      }
      _ => {}
    }
  }

  pub fn heartbeat(&mut self, at: DateTime<Utc>) {
    self.last_heartbeat = at;
    self.last_seen = at;
    if self.status == RobotStatus::Offline {
      self.status = RobotStatus::Online;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn online_robot(capacity: u32) -> Robot {
    let mut robot = Robot::new("r-1", "robot-one", "host-a");
    robot.status = RobotStatus::Online;
    robot.max_concurrent_jobs = capacity;
    robot
  }

  #[test]
  fn test_add_job_respects_capacity() {
    let mut robot = online_robot(2);
    assert!(robot.add_job("j-1"));
    assert!(robot.add_job("j-2"));
    assert!(!robot.add_job("j-3"));
    assert_eq!(robot.current_job_count(), 2);
    assert!(robot.current_job_count() <= robot.max_concurrent_jobs as usize);
  }

  #[test]
  fn test_status_flips_to_busy_at_capacity_and_back() {
    let mut robot = online_robot(1);
    assert!(robot.add_job("j-1"));
    assert_eq!(robot.status, RobotStatus::Busy);
    assert!(robot.remove_job("j-1"));
    assert_eq!(robot.status, RobotStatus::Online);
  }

  #[test]
  fn test_job_mutation_leaves_maintenance_status_alone() {
    let mut robot = online_robot(2);
    assert!(robot.add_job("j-1"));
    robot.status = RobotStatus::Maintenance;
    assert!(!robot.add_job("j-2"));
    assert!(robot.remove_job("j-1"));
    assert_eq!(robot.status, RobotStatus::Maintenance);
  }

  #[test]
  fn test_heartbeat_revives_offline_robot() {
    let mut robot = Robot::new("r-1", "robot-one", "host-a");
    assert_eq!(robot.status, RobotStatus::Offline);
    robot.heartbeat(Utc::now());
    assert_eq!(robot.status, RobotStatus::Online);
  }

  #[test]
  fn test_parse_many_partitions_unknown_tokens() {
    let (known, unknown) = RobotCapability::parse_many(["gpu", "bogus_cap", "browser"]);
    assert_eq!(
      known,
      HashSet::from([RobotCapability::Gpu, RobotCapability::Browser])
    );
    assert_eq!(unknown, vec!["bogus_cap".to_string()]);
  }

  #[test]
  fn test_empty_requirement_is_always_satisfied() {
    let robot = online_robot(1);
    assert!(robot.has_capabilities(&HashSet::new()));
    assert!(!robot.has_capabilities(&HashSet::from([RobotCapability::Gpu])));
  }
}
