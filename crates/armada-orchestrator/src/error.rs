use thiserror::Error;

use armada_store::StoreError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
  /// A referenced robot id does not exist.
  #[error("robot not found: {0}")]
  RobotNotFound(String),

  /// No robot satisfies the availability/capability constraints.
  #[error("no available robot: {0}")]
  NoAvailableRobot(String),

  /// Malformed caller input: blank ids, or an override targeting nothing.
  #[error("invalid assignment: {0}")]
  InvalidAssignment(String),

  /// The use case was constructed without a dependency it needs.
  #[error("configuration error: {0}")]
  Configuration(String),

  #[error(transparent)]
  Domain(#[from] armada_domain::DomainError),

  #[error(transparent)]
  Store(#[from] StoreError),
}
