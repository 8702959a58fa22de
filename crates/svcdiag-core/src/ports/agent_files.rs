//! AgentFiles port - file access on the agents running tasks.

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::domain::AgentId;
use crate::error::DiagError;

/// AgentFiles browses and downloads files on one agent.
#[async_trait]
pub trait AgentFiles: Send + Sync {
    /// Every executor sandbox directory the agent currently exposes.
    async fn executor_paths(&self, agent_id: &AgentId) -> Result<Vec<String>, DiagError>;

    /// Full paths of the regular files directly inside `directory`.
    async fn list_files(&self, agent_id: &AgentId, directory: &str)
    -> Result<Vec<String>, DiagError>;

    /// Stream the file at `path` into `sink` and return the byte count.
    ///
    /// The body is copied chunk by chunk; it is never held in memory as a
    /// whole.
    async fn download(
        &self,
        agent_id: &AgentId,
        path: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, DiagError>;
}
