//! Agent file locator: maps tasks to executor sandbox directories.
//!
//! An agent exposes its sandboxes as
//! `.../frameworks/<framework_id>/executors/<executor_id>/runs/<run>`.
//! The listing is fetched once per agent and matched against every task on
//! that agent.

use std::collections::BTreeSet;

use tracing::debug;

use crate::domain::{AgentId, Task};

/// One executor run directory found on an agent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct RunDir {
    framework_id: String,
    executor_id: String,
    run: String,
    path: String,
}

impl RunDir {
    fn parse(path: &str) -> Option<Self> {
        let trimmed = path.trim_end_matches('/');
        let segments: Vec<&str> = trimmed.split('/').collect();
        let n = segments.len();
        if n < 6 {
            return None;
        }
        let [frameworks, framework_id, executors, executor_id, runs, run] =
            <[&str; 6]>::try_from(&segments[n - 6..]).ok()?;
        if frameworks != "frameworks" || executors != "executors" || runs != "runs" {
            return None;
        }
        if framework_id.is_empty() || executor_id.is_empty() || run.is_empty() {
            return None;
        }
        Some(Self {
            framework_id: framework_id.to_string(),
            executor_id: executor_id.to_string(),
            run: run.to_string(),
            path: trimmed.to_string(),
        })
    }
}

/// Executor sandboxes available on one agent, rebuilt for every run.
#[derive(Debug, Clone)]
pub struct ExecutorPaths {
    agent_id: AgentId,
    runs: Vec<RunDir>,
}

impl ExecutorPaths {
    /// Build from the agent's directory listing; unrelated entries are ignored.
    pub fn from_listing<I>(agent_id: AgentId, listing: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let runs: BTreeSet<RunDir> = listing
            .into_iter()
            .filter_map(|p| RunDir::parse(&p))
            .collect();
        Self {
            agent_id,
            runs: runs.into_iter().collect(),
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Sandbox directory of `task`, if the agent has one.
    ///
    /// # Matching
    /// - executor id is the task's `executor_id`, or the task id for command tasks
    /// - restricted to the task's framework when the record carries one
    /// - several frameworks with the same executor id and no framework on the
    ///   task: ambiguous, no match
    /// - run `latest` wins, otherwise the greatest run id
    /// - tasks sharing an executor live under `<run>/tasks/<task_id>`
    pub fn find_sandbox(&self, task: &Task) -> Option<String> {
        let executor = task.executor_name();
        let candidates: Vec<&RunDir> = self
            .runs
            .iter()
            .filter(|r| r.executor_id == executor)
            .filter(|r| {
                task.framework_id
                    .as_ref()
                    .is_none_or(|fw| fw.as_str() == r.framework_id)
            })
            .collect();

        let frameworks: BTreeSet<&str> =
            candidates.iter().map(|r| r.framework_id.as_str()).collect();
        if frameworks.len() > 1 {
            debug!(
                agent_id = %self.agent_id,
                task_id = %task.id,
                ?frameworks,
                "executor id is ambiguous across frameworks"
            );
            return None;
        }

        let best = candidates
            .into_iter()
            .max_by(|a, b| (a.run == "latest", &a.run).cmp(&(b.run == "latest", &b.run)))?;

        if task.has_shared_executor() {
            Some(format!("{}/tasks/{}", best.path, task.id))
        } else {
            Some(best.path.clone())
        }
    }
}
