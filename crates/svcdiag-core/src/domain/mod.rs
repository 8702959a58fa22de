//! Domain model (ids, task and service records, command output, bundle report).

pub mod command;
pub mod ids;
pub mod report;
pub mod service;
pub mod task;

pub use command::{CommandOutput, CommandTarget};
pub use ids::{AgentId, FrameworkId, Id, IdMarker, TaskId};
pub use report::{ArtifactOutcome, BundleReport, OutcomeKind, TaskLogOutcome};
pub use service::ServiceRecord;
pub use task::{Task, TaskState};
