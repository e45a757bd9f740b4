//! Capability/load-based robot selection.

use std::cmp::Ordering;
use std::collections::HashSet;

use armada_domain::{Robot, RobotCapability};

/// Pure selection over a snapshot of already-available robots: filter to
/// capability supersets of the requirement, then pick the least-loaded
/// candidate. Deterministic for a given snapshot.
pub struct RobotSelectionService;

impl RobotSelectionService {
  /// Robots whose capability set covers the requirement. An empty
  /// requirement keeps every candidate.
  pub fn filter_capable<'a>(
    robots: &'a [Robot],
    required: &HashSet<RobotCapability>,
  ) -> Vec<&'a Robot> {
    robots.iter().filter(|r| r.has_capabilities(required)).collect()
  }

  /// The least-loaded capable robot, or None when nothing qualifies.
  pub fn select<'a>(
    robots: &'a [Robot],
    required: &HashSet<RobotCapability>,
  ) -> Option<&'a Robot> {
    Self::filter_capable(robots, required)
      .into_iter()
      .min_by(|a, b| load_order(a, b))
  }
}

/// Orders by load ratio (compared exactly via cross-multiplication), then
/// absolute job count, then robot id for a stable tie-break.
fn load_order(a: &Robot, b: &Robot) -> Ordering {
  let lhs = a.current_job_count() as u64 * b.max_concurrent_jobs as u64;
  let rhs = b.current_job_count() as u64 * a.max_concurrent_jobs as u64;
  lhs
    .cmp(&rhs)
    .then(a.current_job_count().cmp(&b.current_job_count()))
    .then(a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
  use super::*;
  use armada_domain::RobotStatus;

  fn robot(id: &str, capacity: u32, running: usize, caps: &[RobotCapability]) -> Robot {
    let mut robot = Robot::new(id, format!("name-{id}"), "host");
    robot.status = RobotStatus::Online;
    robot.max_concurrent_jobs = capacity;
    robot.capabilities = caps.iter().copied().collect();
    robot.current_job_ids = (0..running).map(|i| format!("j-{i}")).collect();
    robot
  }

  #[test]
  fn test_selects_least_loaded_capable_robot() {
    let robots = vec![
      robot("r-a", 5, 2, &[RobotCapability::Browser]),
      robot("r-b", 5, 0, &[RobotCapability::Browser]),
    ];
    let required = HashSet::from([RobotCapability::Browser]);
    let selected = RobotSelectionService::select(&robots, &required).unwrap();
    assert_eq!(selected.id, "r-b");
  }

  #[test]
  fn test_capability_filter_excludes_mismatches() {
    let robots = vec![
      robot("r-a", 5, 0, &[RobotCapability::Desktop]),
      robot("r-b", 5, 4, &[RobotCapability::Browser, RobotCapability::Gpu]),
    ];
    let required = HashSet::from([RobotCapability::Browser]);
    let selected = RobotSelectionService::select(&robots, &required).unwrap();
    assert_eq!(selected.id, "r-b");
  }

  #[test]
  fn test_empty_requirement_keeps_all_candidates() {
    let robots = vec![robot("r-a", 5, 1, &[]), robot("r-b", 5, 0, &[])];
    let selected = RobotSelectionService::select(&robots, &HashSet::new()).unwrap();
    assert_eq!(selected.id, "r-b");
  }

  #[test]
  fn test_no_capable_robot_yields_none() {
    let robots = vec![robot("r-a", 5, 0, &[RobotCapability::Desktop])];
    let required = HashSet::from([RobotCapability::Gpu]);
    assert!(RobotSelectionService::select(&robots, &required).is_none());
  }

  #[test]
  fn test_load_ratio_beats_absolute_count() {
    // 2/10 is lighter than 1/2.
    let robots = vec![robot("r-a", 2, 1, &[]), robot("r-b", 10, 2, &[])];
    let selected = RobotSelectionService::select(&robots, &HashSet::new()).unwrap();
    assert_eq!(selected.id, "r-b");
  }

  #[test]
  fn test_tie_breaks_by_id_for_reproducibility() {
    let robots = vec![robot("r-b", 5, 1, &[]), robot("r-a", 5, 1, &[])];
    let selected = RobotSelectionService::select(&robots, &HashSet::new()).unwrap();
    assert_eq!(selected.id, "r-a");
  }
}
