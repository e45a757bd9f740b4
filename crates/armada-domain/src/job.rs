use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
  Pending,
  Queued,
  Running,
  Completed,
  Failed,
  Cancelled,
  Timeout,
}

impl JobStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      JobStatus::Pending => "pending",
      JobStatus::Queued => "queued",
      JobStatus::Running => "running",
      JobStatus::Completed => "completed",
      JobStatus::Failed => "failed",
      JobStatus::Cancelled => "cancelled",
      JobStatus::Timeout => "timeout",
    }
  }

  /// Parse a stored status string. Unknown or legacy values decode as
  /// `Pending` rather than failing the read.
  pub fn from_str_lossy(s: &str) -> Self {
    match s {
      "queued" => JobStatus::Queued,
      "running" => JobStatus::Running,
      "completed" => JobStatus::Completed,
      "failed" => JobStatus::Failed,
      "cancelled" => JobStatus::Cancelled,
      "timeout" => JobStatus::Timeout,
      _ => JobStatus::Pending,
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Timeout
    )
  }
}

/// Scheduling priority. Higher-priority pending jobs are claimed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
  Low,
  Normal,
  High,
  Critical,
}

impl Default for JobPriority {
  fn default() -> Self {
    JobPriority::Normal
  }
}

impl JobPriority {
  pub fn as_str(&self) -> &'static str {
    match self {
      JobPriority::Low => "low",
      JobPriority::Normal => "normal",
      JobPriority::High => "high",
      JobPriority::Critical => "critical",
    }
  }

  /// Numeric rank used for ordering (higher claims first).
  pub fn rank(&self) -> i32 {
    match self {
      JobPriority::Low => 0,
      JobPriority::Normal => 1,
      JobPriority::High => 2,
      JobPriority::Critical => 3,
    }
  }

  pub fn from_str_lossy(s: &str) -> Self {
    match s {
      "low" => JobPriority::Low,
      "high" => JobPriority::High,
      "critical" => JobPriority::Critical,
      _ => JobPriority::Normal,
    }
  }
}

/// One unit of automation work tied to a workflow, bound to a robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
  pub id: String,
  pub workflow_id: String,
  #[serde(default)]
  pub workflow_name: Option<String>,
  pub robot_id: String,
  #[serde(default)]
  pub robot_name: Option<String>,
  pub status: JobStatus,
  pub priority: JobPriority,
  #[serde(default)]
  pub environment: Option<String>,
  /// Serialized node graph plus merged runtime variables.
  pub workflow_json: String,
  #[serde(default)]
  pub scheduled_time: Option<DateTime<Utc>>,
  #[serde(default)]
  pub started_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub completed_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub duration_ms: Option<i64>,
  #[serde(default)]
  pub progress: u8,
  #[serde(default)]
  pub current_node: Option<String>,
  #[serde(default)]
  pub result: Map<String, Value>,
  #[serde(default)]
  pub logs: String,
  #[serde(default)]
  pub error_message: Option<String>,
  pub created_at: DateTime<Utc>,
  #[serde(default)]
  pub created_by: Option<String>,
}

impl Job {
  pub fn new(
    id: impl Into<String>,
    workflow_id: impl Into<String>,
    robot_id: impl Into<String>,
    workflow_json: impl Into<String>,
  ) -> Self {
    Self {
      id: id.into(),
      workflow_id: workflow_id.into(),
      workflow_name: None,
      robot_id: robot_id.into(),
      robot_name: None,
      status: JobStatus::Pending,
      priority: JobPriority::Normal,
      environment: None,
      workflow_json: workflow_json.into(),
      scheduled_time: None,
      started_at: None,
      completed_at: None,
      duration_ms: None,
      progress: 0,
      current_node: None,
      result: Map::new(),
      logs: String::new(),
      error_message: None,
      created_at: Utc::now(),
      created_by: None,
    }
  }

  pub fn is_terminal(&self) -> bool {
    self.status.is_terminal()
  }

  /// Duration derived from the start/completion timestamps, in
  /// milliseconds. None until both are set.
  pub fn duration_millis(&self) -> Option<i64> {
    match (self.started_at, self.completed_at) {
      (Some(started), Some(completed)) => Some((completed - started).num_milliseconds()),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_unknown_status_decodes_as_pending() {
    assert_eq!(JobStatus::from_str_lossy("dispatched"), JobStatus::Pending);
    assert_eq!(JobStatus::from_str_lossy(""), JobStatus::Pending);
    assert_eq!(JobStatus::from_str_lossy("running"), JobStatus::Running);
  }

  #[test]
  fn test_priority_rank_ordering() {
    assert!(JobPriority::Critical.rank() > JobPriority::High.rank());
    assert!(JobPriority::High.rank() > JobPriority::Normal.rank());
    assert!(JobPriority::Normal.rank() > JobPriority::Low.rank());
  }

  #[test]
  fn test_duration_requires_both_timestamps() {
    let mut job = Job::new("j-1", "wf-1", "r-1", "{}");
    assert_eq!(job.duration_millis(), None);
    let started = Utc::now();
    job.started_at = Some(started);
    job.completed_at = Some(started + chrono::Duration::milliseconds(1500));
    assert_eq!(job.duration_millis(), Some(1500));
  }

  #[test]
  fn test_terminal_states() {
    for status in [
      JobStatus::Completed,
      JobStatus::Failed,
      JobStatus::Cancelled,
      JobStatus::Timeout,
    ] {
      assert!(status.is_terminal());
    }
    for status in [JobStatus::Pending, JobStatus::Queued, JobStatus::Running] {
      assert!(!status.is_terminal());
    }
  }
}
