//! In-memory adapters for tests and dry runs.
//!
//! # Contents
//! - **ScriptedCommandRunner**: canned responses per (target, command line)
//! - **StaticTaskDirectory**: a sequence of service records, the last one repeats
//! - **InMemoryAgentFiles**: executor paths and sandbox files per agent
//! - **MemoryBundleStore**: bundle contents in a sorted map

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::domain::{AgentId, CommandOutput, CommandTarget, FrameworkId, ServiceRecord, Task};
use crate::error::DiagError;
use crate::ports::{AgentFiles, ArtifactWriter, BundleStore, CommandRunner, TaskDirectory};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

type CommandKey = (CommandTarget, String);

/// Replays scripted outputs.
///
/// Responses registered for the same key are returned in order; the last one
/// repeats. Unscripted commands exit 127.
#[derive(Debug, Default)]
pub struct ScriptedCommandRunner {
    responses: Mutex<HashMap<CommandKey, VecDeque<CommandOutput>>>,
    calls: Mutex<Vec<CommandKey>>,
}

impl ScriptedCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, target: &CommandTarget, command_line: &str, output: CommandOutput) {
        lock(&self.responses)
            .entry((target.clone(), command_line.to_string()))
            .or_default()
            .push_back(output);
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<(CommandTarget, String)> {
        lock(&self.calls).clone()
    }

    pub fn calls_for(&self, target: &CommandTarget, command_line: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|(t, c)| t == target && c == command_line)
            .count()
    }
}

#[async_trait]
impl CommandRunner for ScriptedCommandRunner {
    async fn run(
        &self,
        target: &CommandTarget,
        command_line: &str,
    ) -> Result<CommandOutput, DiagError> {
        let key = (target.clone(), command_line.to_string());
        lock(&self.calls).push(key.clone());

        let mut responses = lock(&self.responses);
        let output = match responses.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        Ok(output.unwrap_or_else(|| {
            CommandOutput::failed(127, format!("no scripted response for {target}: {command_line}"))
        }))
    }
}

/// Serves service records in order, repeating the last one.
#[derive(Debug)]
pub struct StaticTaskDirectory {
    records: Mutex<VecDeque<ServiceRecord>>,
    scheduler: Vec<Task>,
}

impl StaticTaskDirectory {
    pub fn sequence(records: Vec<ServiceRecord>) -> Self {
        Self {
            records: Mutex::new(records.into()),
            scheduler: Vec::new(),
        }
    }

    /// A service with no tasks.
    pub fn empty(service_name: &str) -> Self {
        let record = ServiceRecord {
            id: FrameworkId::parse(format!("{service_name}-framework"))
                .expect("framework id is never blank"),
            name: service_name.to_string(),
            active: true,
            tasks: Vec::new(),
            completed_tasks: Vec::new(),
        };
        Self::sequence(vec![record])
    }

    pub fn with_scheduler_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.scheduler = tasks;
        self
    }
}

#[async_trait]
impl TaskDirectory for StaticTaskDirectory {
    async fn service(&self, service_name: &str) -> Result<ServiceRecord, DiagError> {
        let mut records = lock(&self.records);
        let record = if records.len() > 1 {
            records.pop_front()
        } else {
            records.front().cloned()
        };
        record
            .filter(|r| r.name == service_name)
            .ok_or_else(|| DiagError::ServiceNotFound(service_name.to_string()))
    }

    async fn scheduler_tasks(&self, _service_name: &str) -> Result<Vec<Task>, DiagError> {
        Ok(self.scheduler.clone())
    }
}

#[derive(Debug, Default)]
struct AgentState {
    executor_paths: Vec<String>,
    /// Full path to contents; `None` is listed but fails to download.
    files: BTreeMap<String, Option<Vec<u8>>>,
    path_queries: usize,
    /// `executor_paths` calls still to answer with 503.
    unavailable: usize,
}

/// Agents with fixed sandboxes. Unknown agents answer 404.
#[derive(Debug, Default)]
pub struct InMemoryAgentFiles {
    agents: Mutex<HashMap<AgentId, AgentState>>,
}

impl InMemoryAgentFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_executor_path(&self, agent_id: &AgentId, path: &str) {
        lock(&self.agents)
            .entry(agent_id.clone())
            .or_default()
            .executor_paths
            .push(path.to_string());
    }

    pub fn add_file(&self, agent_id: &AgentId, path: &str, contents: Vec<u8>) {
        lock(&self.agents)
            .entry(agent_id.clone())
            .or_default()
            .files
            .insert(path.to_string(), Some(contents));
    }

    /// A file that shows up in listings but cannot be downloaded.
    pub fn add_listed_only(&self, agent_id: &AgentId, path: &str) {
        lock(&self.agents)
            .entry(agent_id.clone())
            .or_default()
            .files
            .insert(path.to_string(), None);
    }

    /// Answer the next `times` executor path queries with 503.
    pub fn unavailable_for(&self, agent_id: &AgentId, times: usize) {
        lock(&self.agents)
            .entry(agent_id.clone())
            .or_default()
            .unavailable = times;
    }

    /// How often `executor_paths` was asked for this agent.
    pub fn path_queries(&self, agent_id: &AgentId) -> usize {
        lock(&self.agents)
            .get(agent_id)
            .map_or(0, |a| a.path_queries)
    }

    fn status(agent_id: &AgentId, status: u16, url: &str) -> DiagError {
        DiagError::AgentStatus {
            agent_id: agent_id.clone(),
            status,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl AgentFiles for InMemoryAgentFiles {
    async fn executor_paths(&self, agent_id: &AgentId) -> Result<Vec<String>, DiagError> {
        let mut agents = lock(&self.agents);
        let agent = agents
            .get_mut(agent_id)
            .ok_or_else(|| Self::status(agent_id, 404, "files/debug"))?;
        agent.path_queries += 1;
        if agent.unavailable > 0 {
            agent.unavailable -= 1;
            return Err(Self::status(agent_id, 503, "files/debug"));
        }
        Ok(agent.executor_paths.clone())
    }

    async fn list_files(
        &self,
        agent_id: &AgentId,
        directory: &str,
    ) -> Result<Vec<String>, DiagError> {
        let agents = lock(&self.agents);
        let agent = agents
            .get(agent_id)
            .ok_or_else(|| Self::status(agent_id, 404, directory))?;
        let prefix = format!("{}/", directory.trim_end_matches('/'));
        Ok(agent
            .files
            .keys()
            .filter(|path| {
                path.strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
            })
            .cloned()
            .collect())
    }

    async fn download(
        &self,
        agent_id: &AgentId,
        path: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, DiagError> {
        let contents = lock(&self.agents)
            .get(agent_id)
            .and_then(|a| a.files.get(path).cloned().flatten())
            .ok_or_else(|| Self::status(agent_id, 404, path))?;
        sink.write_all(&contents)
            .await
            .map_err(|source| DiagError::Io {
                path: path.into(),
                source,
            })?;
        Ok(contents.len() as u64)
    }
}

type Files = Arc<Mutex<BTreeMap<String, Vec<u8>>>>;

/// Bundle contents keyed by relative path.
#[derive(Debug, Default)]
pub struct MemoryBundleStore {
    files: Files,
}

/// Appends straight into the store entry it was opened for.
struct MemoryWriter {
    files: Files,
    path: String,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        lock(&self.files)
            .entry(self.path.clone())
            .or_default()
            .extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl MemoryBundleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored paths in sorted order.
    pub fn paths(&self) -> Vec<String> {
        lock(&self.files).keys().cloned().collect()
    }

    pub fn contents(&self, relative_path: &str) -> Option<Vec<u8>> {
        lock(&self.files).get(relative_path).cloned()
    }
}

#[async_trait]
impl BundleStore for MemoryBundleStore {
    async fn write(&self, relative_path: &str, contents: &[u8]) -> Result<(), DiagError> {
        lock(&self.files).insert(relative_path.to_string(), contents.to_vec());
        Ok(())
    }

    async fn open(&self, relative_path: &str) -> Result<ArtifactWriter, DiagError> {
        lock(&self.files).insert(relative_path.to_string(), Vec::new());
        Ok(Box::new(MemoryWriter {
            files: Arc::clone(&self.files),
            path: relative_path.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_responses_play_in_order_and_repeat() {
        let runner = ScriptedCommandRunner::new();
        let target = CommandTarget::Cluster;
        runner.respond(&target, "task --all --json", CommandOutput::failed(1, "busy"));
        runner.respond(&target, "task --all --json", CommandOutput::ok("[]"));

        let codes: Vec<i32> = [
            runner.run(&target, "task --all --json").await.unwrap().exit_code,
            runner.run(&target, "task --all --json").await.unwrap().exit_code,
            runner.run(&target, "task --all --json").await.unwrap().exit_code,
            runner.run(&target, "service --json").await.unwrap().exit_code,
        ]
        .into();
        assert_eq!(codes, vec![1, 0, 0, 127]);
        assert_eq!(runner.calls().len(), 4);
    }

    #[tokio::test]
    async fn listing_only_returns_direct_children() {
        let agent = AgentId::parse("a").unwrap();
        let files = InMemoryAgentFiles::new();
        files.add_file(&agent, "/sb/stdout", b"1".to_vec());
        files.add_file(&agent, "/sb/tasks/t1/stdout", b"2".to_vec());

        let listed = files.list_files(&agent, "/sb/").await.unwrap();
        assert_eq!(listed, vec!["/sb/stdout".to_string()]);
    }

    #[tokio::test]
    async fn unavailable_agent_recovers_after_the_given_calls() {
        let agent = AgentId::parse("a").unwrap();
        let files = InMemoryAgentFiles::new();
        files.add_executor_path(&agent, "/sb");
        files.unavailable_for(&agent, 1);

        let first = files.executor_paths(&agent).await.unwrap_err();
        assert!(matches!(first, DiagError::AgentStatus { status: 503, .. }));
        assert_eq!(files.executor_paths(&agent).await.unwrap(), vec!["/sb"]);
        assert_eq!(files.path_queries(&agent), 2);
    }

    #[tokio::test]
    async fn streamed_writes_replace_earlier_contents() {
        let store = MemoryBundleStore::new();
        store.write("tasks/t1/stdout", b"old").await.unwrap();

        let mut writer = store.open("tasks/t1/stdout").await.unwrap();
        writer.write_all(b"new ").await.unwrap();
        writer.write_all(b"lines").await.unwrap();
        writer.shutdown().await.unwrap();

        assert_eq!(store.contents("tasks/t1/stdout").unwrap(), b"new lines");
    }
}
