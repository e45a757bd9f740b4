//! Armada Orchestrator
//!
//! Use cases for assigning automation jobs to a fleet of robots. A robot
//! for a job is resolved through a layered policy:
//!
//! ```text
//! explicit robot_id ──► workflow assignment ──► auto-selection
//!   (must exist and      (default first, then    (capability filter +
//!    be available)        priority order)         least-loaded pick)
//! ```
//!
//! Submission persists the job as pending and hands it to an external
//! [`JobDispatcher`] for best-effort immediate delivery; a failed dispatch
//! is logged and swallowed, leaving the job for a robot's next
//! `claim_next_job` poll. "Job accepted" is decoupled from "job
//! delivered".
//!
//! All validation errors are raised before any persistence side effect.

mod assign;
mod dispatcher;
mod error;
mod list;
mod selection;
mod submit;

pub use assign::AssignRobotUseCase;
pub use dispatcher::{DispatchError, JobDispatcher, NoopDispatcher};
pub use error::OrchestratorError;
pub use list::{CapacityStatistics, FleetStatistics, ListRobotsUseCase};
pub use selection::RobotSelectionService;
pub use submit::{SubmitJobRequest, SubmitJobUseCase};
