//! BundleBuilder: wiring and start-up validation for a bundle run.

use std::sync::Arc;

use regex::Regex;

use super::bundle::{ServiceBundle, TechBundle};
use crate::config::BundleConfig;
use crate::error::DiagError;
use crate::ports::{AgentFiles, BundleStore, Clock, CommandRunner, SystemClock, TaskDirectory};

/// Assembles a [`ServiceBundle`] from configuration and port adapters.
///
/// # Example
/// ```ignore
/// let bundle = BundleBuilder::new(BundleConfig::new("kafka", "kafka"))
///     .runner(runner)
///     .task_directory(directory)
///     .agent_files(agents)
///     .store(store)
///     .build()?;
/// let report = bundle.create().await;
/// ```
///
/// # Fail-fast
/// `build()` checks configuration, compiles download patterns and reports
/// every missing collaborator at once, before any remote call is made.
pub struct BundleBuilder {
    config: BundleConfig,
    runner: Option<Arc<dyn CommandRunner>>,
    tasks: Option<Arc<dyn TaskDirectory>>,
    agents: Option<Arc<dyn AgentFiles>>,
    store: Option<Arc<dyn BundleStore>>,
    clock: Option<Arc<dyn Clock>>,
    tech: Vec<Box<dyn TechBundle>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing collaborators: {0:?}")]
    MissingCollaborators(Vec<&'static str>),

    #[error("invalid bundle configuration: {0}")]
    InvalidConfig(#[from] DiagError),
}

impl BundleBuilder {
    pub fn new(config: BundleConfig) -> Self {
        Self {
            config,
            runner: None,
            tasks: None,
            agents: None,
            store: None,
            clock: None,
            tech: Vec::new(),
        }
    }

    pub fn runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn task_directory(mut self, tasks: Arc<dyn TaskDirectory>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    pub fn agent_files(mut self, agents: Arc<dyn AgentFiles>) -> Self {
        self.agents = Some(agents);
        self
    }

    pub fn store(mut self, store: Arc<dyn BundleStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Add a technology bundle; they run in the order added.
    pub fn tech(mut self, tech: Box<dyn TechBundle>) -> Self {
        self.tech.push(tech);
        self
    }

    pub fn build(self) -> Result<ServiceBundle, BuildError> {
        self.config.validate()?;
        let patterns = self
            .config
            .download_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()
            .map_err(DiagError::from)?;

        let mut missing = Vec::new();
        if self.runner.is_none() {
            missing.push("command runner");
        }
        if self.tasks.is_none() {
            missing.push("task directory");
        }
        if self.agents.is_none() {
            missing.push("agent files");
        }
        if self.store.is_none() {
            missing.push("bundle store");
        }

        match (self.runner, self.tasks, self.agents, self.store) {
            (Some(runner), Some(tasks), Some(agents), Some(store)) => Ok(ServiceBundle {
                config: self.config,
                patterns,
                runner,
                tasks,
                agents,
                store,
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                tech: self.tech,
            }),
            _ => Err(BuildError::MissingCollaborators(missing)),
        }
    }
}
