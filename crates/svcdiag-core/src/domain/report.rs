//! Bundle report: what one collection run wrote, skipped or failed.
//!
//! The report is written last as `bundle_report.json` so an operator can tell
//! from the bundle alone which artifacts are missing and why.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::{AgentId, TaskId};

/// Result classification of one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Written,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactOutcome {
    pub name: String,
    pub kind: OutcomeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Log download result for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLogOutcome {
    pub task_id: TaskId,
    pub agent_id: AgentId,
    /// `None` when no sandbox matched the task on its agent.
    pub sandbox: Option<String>,
    /// Bundle-relative paths of downloaded files.
    pub files: Vec<String>,
    pub errors: Vec<String>,
}

impl TaskLogOutcome {
    pub fn unresolved(task_id: TaskId, agent_id: AgentId) -> Self {
        Self {
            task_id,
            agent_id,
            sandbox: None,
            files: Vec::new(),
            errors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleReport {
    pub run_id: Ulid,
    pub package_name: String,
    pub service_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub artifacts: Vec<ArtifactOutcome>,
    pub tasks: Vec<TaskLogOutcome>,
}

impl BundleReport {
    pub fn new(
        package_name: impl Into<String>,
        service_name: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: Ulid::new(),
            package_name: package_name.into(),
            service_name: service_name.into(),
            started_at,
            finished_at: None,
            artifacts: Vec::new(),
            tasks: Vec::new(),
        }
    }

    pub fn record(&mut self, name: impl Into<String>, kind: OutcomeKind, detail: Option<String>) {
        self.artifacts.push(ArtifactOutcome {
            name: name.into(),
            kind,
            detail,
        });
    }

    pub fn written(&mut self, name: impl Into<String>) {
        self.record(name, OutcomeKind::Written, None);
    }

    pub fn skipped(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        self.record(name, OutcomeKind::Skipped, Some(reason.into()));
    }

    pub fn failed(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        self.record(name, OutcomeKind::Failed, Some(reason.into()));
    }

    pub fn artifact(&self, name: &str) -> Option<&ArtifactOutcome> {
        self.artifacts.iter().find(|a| a.name == name)
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskLogOutcome> {
        self.tasks.iter().find(|t| t.task_id.as_str() == task_id)
    }

    /// Number of artifacts and task files that made it into the bundle.
    pub fn written_count(&self) -> usize {
        let artifacts = self
            .artifacts
            .iter()
            .filter(|a| a.kind == OutcomeKind::Written)
            .count();
        let files: usize = self.tasks.iter().map(|t| t.files.len()).sum();
        artifacts + files
    }

    /// Number of artifacts or tasks that are missing something.
    pub fn problem_count(&self) -> usize {
        let artifacts = self
            .artifacts
            .iter()
            .filter(|a| a.kind != OutcomeKind::Written)
            .count();
        let tasks = self
            .tasks
            .iter()
            .filter(|t| t.sandbox.is_none() || !t.errors.is_empty())
            .count();
        artifacts + tasks
    }
}
