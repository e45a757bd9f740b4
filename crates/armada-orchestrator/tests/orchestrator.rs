//! Integration tests for the orchestrator use cases against the
//! in-memory stores, including the concurrency properties the claim and
//! default-assignment protocols must hold.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;

use armada_domain::{
  CapabilityMap, JobPriority, JobStatus, Robot, RobotCapability, RobotStatus,
};
use armada_orchestrator::{
  AssignRobotUseCase, DispatchError, JobDispatcher, ListRobotsUseCase, NoopDispatcher,
  OrchestratorError, SubmitJobRequest, SubmitJobUseCase,
};
use armada_store::memory::{
  MemoryAssignmentStore, MemoryJobStore, MemoryOverrideStore, MemoryRobotStore,
};
use armada_store::{AssignmentStore, JobStore, RobotStore};

struct Fixture {
  robots: Arc<MemoryRobotStore>,
  jobs: Arc<MemoryJobStore>,
  assignments: Arc<MemoryAssignmentStore>,
  overrides: Arc<MemoryOverrideStore>,
}

impl Fixture {
  fn new() -> Self {
    Self {
      robots: Arc::new(MemoryRobotStore::new()),
      jobs: Arc::new(MemoryJobStore::new()),
      assignments: Arc::new(MemoryAssignmentStore::new()),
      overrides: Arc::new(MemoryOverrideStore::new()),
    }
  }

  fn submit(&self) -> SubmitJobUseCase {
    self.submit_with(Arc::new(NoopDispatcher), browser_capability_map())
  }

  fn submit_with(
    &self,
    dispatcher: Arc<dyn JobDispatcher>,
    capability_map: CapabilityMap,
  ) -> SubmitJobUseCase {
    SubmitJobUseCase::new(
      self.robots.clone(),
      self.jobs.clone(),
      self.assignments.clone(),
      dispatcher,
      capability_map,
    )
  }

  fn assign(&self) -> AssignRobotUseCase {
    AssignRobotUseCase::new(
      self.robots.clone(),
      self.assignments.clone(),
      self.overrides.clone(),
    )
  }

  fn list(&self) -> ListRobotsUseCase {
    ListRobotsUseCase::with_assignments(self.robots.clone(), self.assignments.clone())
  }

  async fn add_robot(&self, id: &str, capacity: u32, running: usize, caps: &[RobotCapability]) {
    let mut robot = Robot::new(id, format!("name-{id}"), format!("host-{id}"));
    robot.status = RobotStatus::Online;
    robot.max_concurrent_jobs = capacity;
    robot.capabilities = caps.iter().copied().collect();
    robot.current_job_ids = (0..running).map(|i| format!("running-{id}-{i}")).collect();
    if robot.at_capacity() {
      robot.status = RobotStatus::Busy;
    }
    self.robots.save(&robot).await.unwrap();
  }
}

fn browser_capability_map() -> CapabilityMap {
  let mut map = CapabilityMap::default();
  map.insert("browser.open", [RobotCapability::Browser]);
  map.insert("excel.read", [RobotCapability::Office]);
  map
}

fn browser_workflow() -> serde_json::Value {
  json!({
    "name": "portal-scrape",
    "nodes": [
      {"node_id": "n1", "type": "browser.open"},
      {"node_id": "n2", "type": "http.get"},
    ],
    "variables": {"region": "eu"},
  })
}

struct FailingDispatcher;

#[async_trait::async_trait]
impl JobDispatcher for FailingDispatcher {
  async fn dispatch(&self, _job: &armada_domain::Job) -> Result<(), DispatchError> {
    Err(DispatchError("robot endpoint unreachable".to_string()))
  }
}

#[tokio::test]
async fn test_submit_picks_least_loaded_capable_robot() {
  let fixture = Fixture::new();
  fixture
    .add_robot("robot-a", 5, 2, &[RobotCapability::Browser])
    .await;
  fixture
    .add_robot("robot-b", 5, 0, &[RobotCapability::Browser])
    .await;

  let job = fixture
    .submit()
    .execute(SubmitJobRequest::new("wf-1", browser_workflow()))
    .await
    .unwrap();

  assert_eq!(job.robot_id, "robot-b");
  assert_eq!(job.status, JobStatus::Pending);
  assert_eq!(job.workflow_name.as_deref(), Some("portal-scrape"));
}

#[tokio::test]
async fn test_submit_blank_workflow_id_fails_before_io() {
  let fixture = Fixture::new();
  let result = fixture
    .submit()
    .execute(SubmitJobRequest::new("   ", browser_workflow()))
    .await;

  assert!(matches!(
    result,
    Err(OrchestratorError::InvalidAssignment(_))
  ));
  assert!(fixture.jobs.get_by_workflow("wf-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_unknown_explicit_robot() {
  let fixture = Fixture::new();
  let mut request = SubmitJobRequest::new("wf-1", browser_workflow());
  request.robot_id = Some("ghost".to_string());

  let result = fixture.submit().execute(request).await;
  assert!(matches!(result, Err(OrchestratorError::RobotNotFound(_))));
}

#[tokio::test]
async fn test_submit_explicit_robot_at_capacity_creates_no_job() {
  let fixture = Fixture::new();
  fixture
    .add_robot("robot-a", 2, 2, &[RobotCapability::Browser])
    .await;

  let mut request = SubmitJobRequest::new("wf-1", browser_workflow());
  request.robot_id = Some("robot-a".to_string());

  let result = fixture.submit().execute(request).await;
  assert!(matches!(result, Err(OrchestratorError::NoAvailableRobot(_))));
  assert!(fixture.jobs.get_by_robot("robot-a").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_no_robots_at_all() {
  let fixture = Fixture::new();
  let result = fixture
    .submit()
    .execute(SubmitJobRequest::new("wf-1", browser_workflow()))
    .await;
  assert!(matches!(result, Err(OrchestratorError::NoAvailableRobot(_))));
}

#[tokio::test]
async fn test_submit_prefers_workflow_assignment_over_auto_selection() {
  let fixture = Fixture::new();
  fixture
    .add_robot("robot-idle", 5, 0, &[RobotCapability::Browser])
    .await;
  fixture
    .add_robot("robot-assigned", 5, 3, &[RobotCapability::Browser])
    .await;
  fixture
    .assign()
    .assign_to_workflow("wf-1", "robot-assigned", true, 0, None)
    .await
    .unwrap();

  let job = fixture
    .submit()
    .execute(SubmitJobRequest::new("wf-1", browser_workflow()))
    .await
    .unwrap();

  assert_eq!(job.robot_id, "robot-assigned");
}

#[tokio::test]
async fn test_submit_falls_back_when_default_robot_is_at_capacity() {
  let fixture = Fixture::new();
  fixture
    .add_robot("robot-default", 1, 1, &[RobotCapability::Browser])
    .await;
  fixture
    .add_robot("robot-spare", 5, 0, &[RobotCapability::Browser])
    .await;
  fixture
    .assign()
    .assign_to_workflow("wf-1", "robot-default", true, 0, None)
    .await
    .unwrap();

  let job = fixture
    .submit()
    .execute(SubmitJobRequest::new("wf-1", browser_workflow()))
    .await
    .unwrap();

  assert_eq!(job.robot_id, "robot-spare");
}

#[tokio::test]
async fn test_submit_skips_capability_mismatched_assignment() {
  let fixture = Fixture::new();
  fixture
    .add_robot("robot-desktop", 5, 0, &[RobotCapability::Desktop])
    .await;
  fixture
    .add_robot("robot-browser", 5, 0, &[RobotCapability::Browser])
    .await;
  fixture
    .assign()
    .assign_to_workflow("wf-1", "robot-desktop", true, 0, None)
    .await
    .unwrap();

  let job = fixture
    .submit()
    .execute(SubmitJobRequest::new("wf-1", browser_workflow()))
    .await
    .unwrap();

  assert_eq!(job.robot_id, "robot-browser");
}

#[tokio::test]
async fn test_submit_merges_variables_override_wins() {
  let fixture = Fixture::new();
  fixture
    .add_robot("robot-a", 5, 0, &[RobotCapability::Browser])
    .await;

  let mut request = SubmitJobRequest::new("wf-1", browser_workflow());
  request.variables = json!({"region": "us", "attempt": 2})
    .as_object()
    .cloned();

  let job = fixture.submit().execute(request).await.unwrap();
  let stored: serde_json::Value = serde_json::from_str(&job.workflow_json).unwrap();
  assert_eq!(stored["variables"]["region"], json!("us"));
  assert_eq!(stored["variables"]["attempt"], json!(2));
}

#[tokio::test]
async fn test_dispatch_failure_still_persists_pending_job() {
  let fixture = Fixture::new();
  fixture
    .add_robot("robot-a", 5, 0, &[RobotCapability::Browser])
    .await;

  let submit = fixture.submit_with(Arc::new(FailingDispatcher), browser_capability_map());
  let job = submit
    .execute(SubmitJobRequest::new("wf-1", browser_workflow()))
    .await
    .unwrap();

  let stored = fixture.jobs.get_by_id(&job.id).await.unwrap().unwrap();
  assert_eq!(stored.status, JobStatus::Pending);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_claims_assign_each_job_exactly_once() {
  let jobs = Arc::new(MemoryJobStore::new());
  let claimants = 16;

  for i in 0..claimants {
    let mut job = armada_domain::Job::new(format!("job-{i}"), "wf-1", "robot-1", "{}");
    job.priority = JobPriority::Normal;
    jobs.save(&job).await.unwrap();
  }

  let mut handles = Vec::new();
  for _ in 0..claimants {
    let jobs = jobs.clone();
    handles.push(tokio::spawn(async move {
      jobs.claim_next_job("robot-1").await.unwrap()
    }));
  }

  let mut claimed_ids = HashSet::new();
  for handle in handles {
    let job = handle.await.unwrap().expect("every claimant should win one job");
    assert_eq!(job.status, JobStatus::Queued);
    assert!(claimed_ids.insert(job.id), "job claimed twice");
  }
  assert_eq!(claimed_ids.len(), claimants);

  // Queue drained: one more claim attempt comes back empty.
  assert!(jobs.claim_next_job("robot-1").await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_set_default_keeps_single_default() {
  let store = Arc::new(MemoryAssignmentStore::new());
  for i in 0..8 {
    let assignment = armada_domain::RobotAssignment::new("wf-1", format!("robot-{i}"));
    store.save(&assignment).await.unwrap();
  }

  let mut handles = Vec::new();
  for i in 0..8 {
    let store = store.clone();
    handles.push(tokio::spawn(async move {
      store.set_default("wf-1", &format!("robot-{i}")).await.unwrap()
    }));
  }
  for handle in handles {
    assert!(handle.await.unwrap());
  }

  let defaults: Vec<_> = store
    .get_for_workflow("wf-1")
    .await
    .unwrap()
    .into_iter()
    .filter(|a| a.is_default)
    .collect();
  assert_eq!(defaults.len(), 1);
}

#[tokio::test]
async fn test_assign_to_node_requires_a_target() {
  let fixture = Fixture::new();
  let result = fixture
    .assign()
    .assign_to_node("wf-1", "n1", None, None, None)
    .await;
  assert!(matches!(
    result,
    Err(OrchestratorError::InvalidAssignment(_))
  ));
}

#[tokio::test]
async fn test_assign_to_node_drops_unknown_capability_tokens() {
  let fixture = Fixture::new();
  let tokens = vec![
    "gpu".to_string(),
    "bogus_cap".to_string(),
    "browser".to_string(),
  ];

  let node_override = fixture
    .assign()
    .assign_to_node("wf-1", "n1", None, Some(&tokens), None)
    .await
    .unwrap();

  assert_eq!(
    node_override.required_capabilities,
    HashSet::from([RobotCapability::Gpu, RobotCapability::Browser])
  );
}

#[tokio::test]
async fn test_deactivate_and_reactivate_node_override() {
  let fixture = Fixture::new();
  fixture.add_robot("robot-a", 1, 0, &[]).await;
  fixture
    .assign()
    .assign_to_node("wf-1", "n1", Some("robot-a"), None, None)
    .await
    .unwrap();

  assert!(fixture.assign().deactivate_node_override("wf-1", "n1").await.unwrap());
  assert!(fixture.assign().get_active_node_overrides("wf-1").await.unwrap().is_empty());

  assert!(fixture.assign().activate_node_override("wf-1", "n1").await.unwrap());
  assert_eq!(
    fixture.assign().get_active_node_overrides("wf-1").await.unwrap().len(),
    1
  );
}

#[tokio::test]
async fn test_set_default_robot_creates_assignment_when_missing() {
  let fixture = Fixture::new();
  fixture.add_robot("robot-a", 1, 0, &[]).await;

  fixture.assign().set_default_robot("wf-1", "robot-a").await.unwrap();

  let default = fixture
    .assignments
    .get_default_for_workflow("wf-1")
    .await
    .unwrap()
    .unwrap();
  assert_eq!(default.robot_id, "robot-a");
}

#[tokio::test]
async fn test_decommission_bulk_removals_report_counts() {
  let fixture = Fixture::new();
  fixture.add_robot("robot-a", 1, 0, &[]).await;
  let assign = fixture.assign();
  assign
    .assign_to_workflow("wf-1", "robot-a", false, 0, None)
    .await
    .unwrap();
  assign
    .assign_to_workflow("wf-2", "robot-a", false, 0, None)
    .await
    .unwrap();
  assign
    .assign_to_node("wf-1", "n1", Some("robot-a"), None, None)
    .await
    .unwrap();

  assert_eq!(assign.unassign_robot_from_all_workflows("robot-a").await.unwrap(), 2);
  assert_eq!(assign.remove_all_node_overrides_for_robot("robot-a").await.unwrap(), 1);
}

#[tokio::test]
async fn test_statistics_on_empty_fleet_are_zero() {
  let fixture = Fixture::new();
  let stats = fixture.list().get_statistics().await.unwrap();

  assert_eq!(stats.total, 0);
  assert_eq!(stats.capacity.total, 0);
  assert_eq!(stats.utilization_percent, 0.0);
}

#[tokio::test]
async fn test_statistics_counts_and_utilization() {
  let fixture = Fixture::new();
  fixture
    .add_robot("robot-a", 4, 2, &[RobotCapability::Browser])
    .await;
  fixture
    .add_robot("robot-b", 1, 1, &[RobotCapability::Browser, RobotCapability::Gpu])
    .await;

  let stats = fixture.list().get_statistics().await.unwrap();
  assert_eq!(stats.total, 2);
  assert_eq!(stats.by_status["online"], 1);
  assert_eq!(stats.by_status["busy"], 1);
  assert_eq!(stats.capacity.total, 5);
  assert_eq!(stats.capacity.used, 3);
  assert_eq!(stats.capacity.available, 2);
  assert_eq!(stats.utilization_percent, 60.0);
  assert_eq!(stats.by_capability["browser"], 2);
  assert_eq!(stats.by_capability["gpu"], 1);
}

#[tokio::test]
async fn test_get_for_workflow_skips_stale_assignments() {
  let fixture = Fixture::new();
  fixture.add_robot("robot-a", 1, 0, &[]).await;
  fixture
    .assign()
    .assign_to_workflow("wf-1", "robot-a", false, 0, None)
    .await
    .unwrap();

  // Decommission the robot but leave the assignment row behind.
  fixture.robots.delete("robot-a").await.unwrap();

  let robots = fixture.list().get_for_workflow("wf-1").await.unwrap();
  assert!(robots.is_empty());
}

#[tokio::test]
async fn test_get_for_workflow_without_assignment_store_is_a_configuration_error() {
  let fixture = Fixture::new();
  let list = ListRobotsUseCase::new(fixture.robots.clone());
  let result = list.get_for_workflow("wf-1").await;
  assert!(matches!(result, Err(OrchestratorError::Configuration(_))));
}

#[tokio::test]
async fn test_search_matches_name_and_tags_case_insensitively() {
  let fixture = Fixture::new();
  let mut robot = Robot::new("robot-a", "Finance-Bot", "host-a");
  robot.status = RobotStatus::Online;
  robot.tags = vec!["invoices".to_string()];
  fixture.robots.save(&robot).await.unwrap();
  fixture.add_robot("robot-b", 1, 0, &[]).await;

  let by_name = fixture.list().search("finance").await.unwrap();
  assert_eq!(by_name.len(), 1);

  let by_tag = fixture.list().search("INVOICE").await.unwrap();
  assert_eq!(by_tag.len(), 1);

  let everyone = fixture.list().search("").await.unwrap();
  assert_eq!(everyone.len(), 2);
}

#[tokio::test]
async fn test_claimed_job_flow_updates_robot_capacity() {
  let fixture = Fixture::new();
  fixture
    .add_robot("robot-a", 1, 0, &[RobotCapability::Browser])
    .await;

  let job = fixture
    .submit()
    .execute(SubmitJobRequest::new("wf-1", browser_workflow()))
    .await
    .unwrap();

  let claimed = fixture.jobs.claim_next_job("robot-a").await.unwrap().unwrap();
  assert_eq!(claimed.id, job.id);

  assert!(fixture.robots.add_current_job("robot-a", &job.id).await.unwrap());
  let robot = fixture.robots.get_by_id("robot-a").await.unwrap().unwrap();
  assert_eq!(robot.status, RobotStatus::Busy);

  assert!(fixture.robots.remove_current_job("robot-a", &job.id).await.unwrap());
  let robot = fixture.robots.get_by_id("robot-a").await.unwrap().unwrap();
  assert_eq!(robot.status, RobotStatus::Online);
}
