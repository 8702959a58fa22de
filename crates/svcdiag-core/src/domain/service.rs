use serde::{Deserialize, Serialize};

use super::{FrameworkId, Task, TaskState};
use crate::error::DiagError;

/// A service (framework) as reported by the cluster's service listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: FrameworkId,
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub completed_tasks: Vec<Task>,
}

impl ServiceRecord {
    /// Pick `service_name` out of a `service --json` listing.
    ///
    /// Inactive registrations linger after reinstalls, so an active match wins
    /// over an inactive one.
    pub fn find_in_listing(listing: &str, service_name: &str) -> Result<Self, DiagError> {
        let services: Vec<ServiceRecord> = serde_json::from_str(listing)
            .map_err(|e| DiagError::malformed("service listing", e))?;

        let mut matching: Vec<ServiceRecord> = services
            .into_iter()
            .filter(|s| s.name == service_name)
            .collect();
        matching.sort_by_key(|s| !s.active);
        matching
            .into_iter()
            .next()
            .ok_or_else(|| DiagError::ServiceNotFound(service_name.to_string()))
    }

    /// Running tasks followed by completed tasks.
    pub fn all_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().chain(self.completed_tasks.iter())
    }

    pub fn tasks_with_state(&self, state: TaskState) -> impl Iterator<Item = &Task> {
        self.all_tasks().filter(move |t| t.state == state)
    }

    pub fn running_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks_with_state(TaskState::Running)
    }
}
