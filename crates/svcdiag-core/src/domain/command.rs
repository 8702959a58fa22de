use std::fmt;

use serde::{Deserialize, Serialize};

use super::TaskId;

/// What a command is run against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandTarget {
    /// Plain CLI command against the cluster.
    Cluster,
    /// Service subcommand: `<package> --name=<service> ...`.
    Service { package: String, service: String },
    /// Command executed inside a running task.
    Task { task_id: TaskId },
}

impl CommandTarget {
    pub fn service(package: impl Into<String>, service: impl Into<String>) -> Self {
        CommandTarget::Service {
            package: package.into(),
            service: service.into(),
        }
    }
}

impl fmt::Display for CommandTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandTarget::Cluster => write!(f, "cluster"),
            CommandTarget::Service { package, service } => write!(f, "{package}/{service}"),
            CommandTarget::Task { task_id } => write!(f, "task {task_id}"),
        }
    }
}

/// Exit code and captured streams of one command.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Exit code 0 and nothing on stderr.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && self.stderr.is_empty()
    }
}
