use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::domain::{AgentId, TaskId};
use crate::retry::RetryError;

/// Operational classification of a failure.
///
/// Decides whether the retry wrapper tries again and how the collector logs
/// the skipped artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Remote call failed or timed out; worth retrying.
    Transient,
    /// A task's sandbox could not be resolved on its host.
    Resolution,
    /// Output was not in the expected shape; retrying will not help.
    Malformed,
    /// Local or configuration problem.
    Fatal,
}

#[derive(Debug, Error)]
pub enum DiagError {
    #[error(
        "command `{command}` failed: exit_code={exit_code} stdout='{stdout}' stderr='{stderr}'"
    )]
    CommandFailed {
        command: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("command `{command}` timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid command line `{0}`")]
    InvalidCommandLine(String),

    #[error("malformed response for {what}: {source}")]
    MalformedResponse {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected response for {what}: {detail}")]
    UnexpectedResponse { what: String, detail: String },

    #[error("service `{0}` not found")]
    ServiceNotFound(String),

    #[error("no executor sandbox path on agent {agent_id} for task {task_id}")]
    NoSandbox { agent_id: AgentId, task_id: TaskId },

    #[error("agent {agent_id} request failed: {source}")]
    Agent {
        agent_id: AgentId,
        #[source]
        source: reqwest::Error,
    },

    #[error("agent {agent_id} returned status {status} for {url}")]
    AgentStatus {
        agent_id: AgentId,
        status: u16,
        url: String,
    },

    #[error("io error on {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid {kind} id `{value}`")]
    InvalidId { kind: &'static str, value: String },

    #[error("invalid plan name `{0}`")]
    InvalidPlanName(String),

    #[error("invalid download pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("topic lists differ: expected={expected:?} actual={actual:?}")]
    TopicMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error(transparent)]
    Retry(Box<RetryError<DiagError>>),
}

impl DiagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DiagError::CommandFailed { .. }
            | DiagError::Timeout { .. }
            | DiagError::ServiceNotFound(_)
            | DiagError::Agent { .. }
            | DiagError::AgentStatus { .. } => ErrorKind::Transient,
            DiagError::NoSandbox { .. } => ErrorKind::Resolution,
            DiagError::MalformedResponse { .. }
            | DiagError::UnexpectedResponse { .. }
            | DiagError::InvalidId { .. }
            | DiagError::InvalidPlanName(_)
            | DiagError::TopicMismatch { .. } => ErrorKind::Malformed,
            DiagError::Spawn { .. }
            | DiagError::InvalidCommandLine(_)
            | DiagError::Io { .. }
            | DiagError::InvalidPattern(_)
            | DiagError::InvalidConfig(_) => ErrorKind::Fatal,
            DiagError::Retry(inner) => match inner.last_error() {
                Some(last) => last.kind(),
                None => ErrorKind::Transient,
            },
        }
    }

    /// Whether the retry wrapper should try again after this error.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub(crate) fn malformed(what: impl Into<String>, source: serde_json::Error) -> Self {
        DiagError::MalformedResponse {
            what: what.into(),
            source,
        }
    }

    pub(crate) fn unexpected(what: impl Into<String>, detail: impl Into<String>) -> Self {
        DiagError::UnexpectedResponse {
            what: what.into(),
            detail: detail.into(),
        }
    }
}

impl From<RetryError<DiagError>> for DiagError {
    fn from(e: RetryError<DiagError>) -> Self {
        DiagError::Retry(Box::new(e))
    }
}
