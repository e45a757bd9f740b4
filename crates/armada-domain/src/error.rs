use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
  #[error("invalid workflow payload: {0}")]
  InvalidWorkflow(#[from] serde_json::Error),
}
