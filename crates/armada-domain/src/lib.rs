//! Armada Domain
//!
//! This crate contains the domain types for the Armada orchestrator:
//! robots (worker processes with bounded capacity and a capability set),
//! jobs (units of automation work tied to a workflow), workflow-level
//! robot assignments, and node-level routing overrides.
//!
//! Types here hold native sets/lists/maps; encoding to the stored JSON
//! representation is the persistence layer's concern. Cross-references
//! between entities are by id only and are resolved through repository
//! lookups at use-case time.

mod assignment;
mod capability_map;
mod error;
mod job;
mod node_override;
mod robot;
mod workflow;

pub use assignment::RobotAssignment;
pub use capability_map::CapabilityMap;
pub use error::DomainError;
pub use job::{Job, JobPriority, JobStatus};
pub use node_override::NodeRobotOverride;
pub use robot::{Robot, RobotCapability, RobotStatus};
pub use workflow::{NodeDef, WorkflowDef};
