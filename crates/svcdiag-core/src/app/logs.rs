//! Task log download: one locator query per agent, then per-task downloads.

use regex::Regex;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use super::grouping::group_by_agent;
use super::locator::ExecutorPaths;
use crate::domain::{AgentId, BundleReport, Task, TaskLogOutcome};
use crate::error::DiagError;
use crate::ports::{AgentFiles, BundleStore};
use crate::retry::Retrying;

/// Base name of a sandbox entry.
fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Every agent call goes through `retrying`; only transient failures are
/// tried again.
pub struct LogDownloader<'a> {
    agents: &'a dyn AgentFiles,
    store: &'a dyn BundleStore,
    retrying: &'a Retrying,
    patterns: &'a [Regex],
}

impl<'a> LogDownloader<'a> {
    pub fn new(
        agents: &'a dyn AgentFiles,
        store: &'a dyn BundleStore,
        retrying: &'a Retrying,
        patterns: &'a [Regex],
    ) -> Self {
        Self {
            agents,
            store,
            retrying,
            patterns,
        }
    }

    fn wanted(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(name))
    }

    /// Download stream files of every task and record one outcome per task.
    pub async fn download_all(&self, tasks: Vec<Task>, report: &mut BundleReport) {
        let groups = group_by_agent(tasks);
        info!(agents = groups.len(), "downloading task logs");

        for (agent_id, tasks) in groups {
            let listing = match self.executor_paths(&agent_id).await {
                Ok(listing) => listing,
                Err(e) => {
                    error!(agent_id = %agent_id, error = %e, "could not list executor paths");
                    for task in tasks {
                        let mut outcome = TaskLogOutcome::unresolved(task.id, agent_id.clone());
                        outcome.errors.push(e.to_string());
                        report.tasks.push(outcome);
                    }
                    continue;
                }
            };
            let paths = ExecutorPaths::from_listing(agent_id.clone(), listing);
            debug!(agent_id = %agent_id, runs = paths.len(), "executor paths");

            for task in &tasks {
                let outcome = self.download_task(&paths, task).await;
                report.tasks.push(outcome);
            }
        }
    }

    async fn download_task(&self, paths: &ExecutorPaths, task: &Task) -> TaskLogOutcome {
        let agent_id = paths.agent_id();
        let Some(sandbox) = paths.find_sandbox(task) else {
            warn!(
                agent_id = %agent_id,
                task_id = %task.id,
                "could not find executor sandbox path"
            );
            let mut outcome = TaskLogOutcome::unresolved(task.id.clone(), agent_id.clone());
            let missing = DiagError::NoSandbox {
                agent_id: agent_id.clone(),
                task_id: task.id.clone(),
            };
            outcome.errors.push(missing.to_string());
            return outcome;
        };

        let mut outcome = TaskLogOutcome {
            task_id: task.id.clone(),
            agent_id: agent_id.clone(),
            sandbox: Some(sandbox.clone()),
            files: Vec::new(),
            errors: Vec::new(),
        };

        let files = match self.list_files(agent_id, &sandbox).await {
            Ok(files) => files,
            Err(e) => {
                error!(
                    agent_id = %agent_id,
                    task_id = %task.id,
                    sandbox = %sandbox,
                    error = %e,
                    "could not list sandbox"
                );
                outcome.errors.push(e.to_string());
                return outcome;
            }
        };

        for file in files.iter().filter(|f| self.wanted(base_name(f))) {
            match self.download_file(agent_id, task, file).await {
                Ok(relative) => outcome.files.push(relative),
                Err(e) => {
                    error!(
                        agent_id = %agent_id,
                        task_id = %task.id,
                        file = %file,
                        error = %e,
                        "could not download file"
                    );
                    outcome.errors.push(format!("{file}: {e}"));
                }
            }
        }
        outcome
    }

    async fn executor_paths(&self, agent_id: &AgentId) -> Result<Vec<String>, DiagError> {
        let agents = self.agents;
        let paths = self
            .retrying
            .call_if(
                move || async move { agents.executor_paths(agent_id).await },
                DiagError::is_transient,
            )
            .await?;
        Ok(paths)
    }

    async fn list_files(
        &self,
        agent_id: &AgentId,
        sandbox: &str,
    ) -> Result<Vec<String>, DiagError> {
        let agents = self.agents;
        let files = self
            .retrying
            .call_if(
                move || async move { agents.list_files(agent_id, sandbox).await },
                DiagError::is_transient,
            )
            .await?;
        Ok(files)
    }

    /// Stream one file into `tasks/<task_id>/<base name>`. A retry reopens
    /// the artifact, dropping whatever a failed attempt left behind.
    async fn download_file(
        &self,
        agent_id: &AgentId,
        task: &Task,
        path: &str,
    ) -> Result<String, DiagError> {
        let relative = format!("tasks/{}/{}", task.id, base_name(path));
        let (agents, store, target) = (self.agents, self.store, relative.as_str());
        let copied = self
            .retrying
            .call_if(
                move || async move {
                    let mut writer = store.open(target).await?;
                    let copied = agents.download(agent_id, path, &mut *writer).await?;
                    writer.shutdown().await.map_err(|source| DiagError::Io {
                        path: target.into(),
                        source,
                    })?;
                    Ok(copied)
                },
                DiagError::is_transient,
            )
            .await?;
        debug!(
            agent_id = %agent_id,
            task_id = %task.id,
            file = target,
            bytes = copied,
            "stored"
        );
        Ok(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskId, TaskState};
    use crate::impls::{InMemoryAgentFiles, MemoryBundleStore};
    use crate::ports::FixedClock;
    use crate::retry::RetryPolicy;
    use chrono::Utc;
    use rstest::rstest;
    use std::sync::Arc;
    use std::time::Duration;

    fn retrying(clock: Arc<FixedClock>) -> Retrying {
        Retrying::new(RetryPolicy::snapshot(), clock)
    }

    fn patterns() -> Vec<Regex> {
        crate::config::DEFAULT_DOWNLOAD_PATTERNS
            .iter()
            .map(|p| Regex::new(p).unwrap())
            .collect()
    }

    fn task(id: &str, agent: &str) -> Task {
        Task {
            id: TaskId::parse(id).unwrap(),
            name: id.to_string(),
            agent_id: AgentId::parse(agent).unwrap(),
            state: TaskState::Running,
            framework_id: None,
            executor_id: String::new(),
        }
    }

    fn run_path(executor: &str) -> String {
        format!("/var/lib/mesos/slaves/a/frameworks/fw/executors/{executor}/runs/latest")
    }

    #[rstest]
    #[case("stdout", true)]
    #[case("stderr.3", true)]
    #[case("stdout.logrotate.conf", false)]
    #[case("executor.zip", false)]
    #[case("mystdout", false)]
    fn stream_files_are_selected_by_base_name(#[case] name: &str, #[case] wanted: bool) {
        let agents = InMemoryAgentFiles::new();
        let store = MemoryBundleStore::new();
        let retrying = retrying(Arc::new(FixedClock::default()));
        let patterns = patterns();
        let downloader = LogDownloader::new(&agents, &store, &retrying, &patterns);
        assert_eq!(downloader.wanted(name), wanted);
    }

    #[tokio::test]
    async fn listing_failure_is_recorded_for_every_task_on_the_agent() {
        let agents = InMemoryAgentFiles::new();
        let store = MemoryBundleStore::new();
        let retrying = retrying(Arc::new(FixedClock::default()));
        let patterns = patterns();
        let mut report = BundleReport::new("kafka", "kafka", Utc::now());

        LogDownloader::new(&agents, &store, &retrying, &patterns)
            .download_all(vec![task("t1", "gone"), task("t2", "gone")], &mut report)
            .await;

        assert_eq!(report.tasks.len(), 2);
        assert!(report.tasks.iter().all(|t| t.sandbox.is_none() && !t.errors.is_empty()));
        assert!(store.paths().is_empty());
    }

    #[tokio::test]
    async fn failed_download_keeps_the_other_files() {
        let agent = AgentId::parse("a").unwrap();
        let sandbox = run_path("t1");
        let agents = InMemoryAgentFiles::new();
        agents.add_executor_path(&agent, &sandbox);
        agents.add_file(&agent, &format!("{sandbox}/stdout"), b"out".to_vec());
        agents.add_listed_only(&agent, &format!("{sandbox}/stderr"));
        let store = MemoryBundleStore::new();
        let retrying = retrying(Arc::new(FixedClock::default()));
        let patterns = patterns();
        let mut report = BundleReport::new("kafka", "kafka", Utc::now());

        LogDownloader::new(&agents, &store, &retrying, &patterns)
            .download_all(vec![task("t1", "a")], &mut report)
            .await;

        assert_eq!(store.paths(), vec!["tasks/t1/stderr", "tasks/t1/stdout"]);
        assert_eq!(store.contents("tasks/t1/stderr").unwrap(), b"");
        let outcome = report.task("t1").unwrap();
        assert_eq!(outcome.files, vec!["tasks/t1/stdout".to_string()]);
        assert_eq!(outcome.errors.len(), 1);
    }

    #[tokio::test]
    async fn unavailable_agent_is_retried_before_giving_up_on_its_tasks() {
        let agent = AgentId::parse("a").unwrap();
        let sandbox = run_path("t1");
        let agents = InMemoryAgentFiles::new();
        agents.add_executor_path(&agent, &sandbox);
        agents.add_file(&agent, &format!("{sandbox}/stdout"), b"out".to_vec());
        agents.unavailable_for(&agent, 1);
        let store = MemoryBundleStore::new();
        let clock = Arc::new(FixedClock::default());
        let retrying = retrying(clock.clone());
        let patterns = patterns();
        let mut report = BundleReport::new("kafka", "kafka", Utc::now());

        LogDownloader::new(&agents, &store, &retrying, &patterns)
            .download_all(vec![task("t1", "a")], &mut report)
            .await;

        assert_eq!(agents.path_queries(&agent), 2);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(2)]);
        assert_eq!(store.contents("tasks/t1/stdout").unwrap(), b"out");
        let outcome = report.task("t1").unwrap();
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.sandbox.as_deref(), Some(sandbox.as_str()));
    }
}
