use async_trait::async_trait;
use thiserror::Error;

use armada_domain::Job;

/// Error from a dispatch attempt. Submission never surfaces this to the
/// caller; the job stays pending for a later claim poll.
#[derive(Debug, Error)]
#[error("dispatch failed: {0}")]
pub struct DispatchError(pub String);

/// Best-effort delivery channel that notifies a robot a job is ready.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
  async fn dispatch(&self, job: &Job) -> Result<(), DispatchError>;
}

/// Dispatcher that delivers nothing; robots find their jobs by polling.
pub struct NoopDispatcher;

#[async_trait]
impl JobDispatcher for NoopDispatcher {
  async fn dispatch(&self, _job: &Job) -> Result<(), DispatchError> {
    Ok(())
  }
}
