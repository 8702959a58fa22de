//! HttpAgentFiles - agent file endpoints proxied by the cluster.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::domain::AgentId;
use crate::error::DiagError;
use crate::ports::AgentFiles;

/// Entry of a `files/browse` listing.
#[derive(Debug, Deserialize)]
struct BrowseEntry {
    path: String,
    /// `ls -l` style, e.g. `drwxr-xr-x` or `-rw-r--r--`.
    mode: String,
}

impl BrowseEntry {
    fn is_dir(&self) -> bool {
        self.mode.starts_with('d')
    }
}

/// Talks to `<cluster_url>/slave/<agent_id>/files/...`.
#[derive(Debug, Clone)]
pub struct HttpAgentFiles {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpAgentFiles {
    pub fn new(
        cluster_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, DiagError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DiagError::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: cluster_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, agent_id: &AgentId, endpoint: &str) -> String {
        format!("{}/slave/{agent_id}/files/{endpoint}", self.base_url)
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.header(reqwest::header::AUTHORIZATION, format!("token={token}")),
            None => request,
        }
    }

    async fn send(
        &self,
        agent_id: &AgentId,
        url: &str,
        request: RequestBuilder,
    ) -> Result<Response, DiagError> {
        let response = request.send().await.map_err(|source| DiagError::Agent {
            agent_id: agent_id.clone(),
            source,
        })?;
        let status = response.status();
        debug!(agent_id = %agent_id, url, status = status.as_u16(), "agent request");
        if !status.is_success() {
            return Err(DiagError::AgentStatus {
                agent_id: agent_id.clone(),
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    /// Listing bodies are small JSON documents and are read whole.
    async fn parse_body<T>(
        &self,
        agent_id: &AgentId,
        response: Response,
        parse: fn(&[u8]) -> Result<T, DiagError>,
    ) -> Result<T, DiagError> {
        let body = response.bytes().await.map_err(|source| DiagError::Agent {
            agent_id: agent_id.clone(),
            source,
        })?;
        parse(&body)
    }
}

/// `files/debug` maps virtual sandbox paths to host paths; the keys are what
/// the other endpoints accept.
fn parse_debug(body: &[u8]) -> Result<Vec<String>, DiagError> {
    let paths: serde_json::Map<String, serde_json::Value> =
        serde_json::from_slice(body).map_err(|e| DiagError::malformed("files/debug", e))?;
    Ok(paths.into_iter().map(|(path, _)| path).collect())
}

fn parse_browse(body: &[u8]) -> Result<Vec<String>, DiagError> {
    let entries: Vec<BrowseEntry> =
        serde_json::from_slice(body).map_err(|e| DiagError::malformed("files/browse", e))?;
    Ok(entries
        .into_iter()
        .filter(|e| !e.is_dir())
        .map(|e| e.path)
        .collect())
}

#[async_trait]
impl AgentFiles for HttpAgentFiles {
    async fn executor_paths(&self, agent_id: &AgentId) -> Result<Vec<String>, DiagError> {
        let url = self.url(agent_id, "debug");
        let response = self.send(agent_id, &url, self.get(&url)).await?;
        self.parse_body(agent_id, response, parse_debug).await
    }

    async fn list_files(
        &self,
        agent_id: &AgentId,
        directory: &str,
    ) -> Result<Vec<String>, DiagError> {
        let url = self.url(agent_id, "browse");
        let request = self.get(&url).query(&[("path", directory)]);
        let response = self.send(agent_id, &url, request).await?;
        self.parse_body(agent_id, response, parse_browse).await
    }

    async fn download(
        &self,
        agent_id: &AgentId,
        path: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, DiagError> {
        let url = self.url(agent_id, "download");
        let request = self.get(&url).query(&[("path", path)]);
        let mut response = self.send(agent_id, &url, request).await?;

        let mut copied = 0u64;
        loop {
            let chunk = response.chunk().await.map_err(|source| DiagError::Agent {
                agent_id: agent_id.clone(),
                source,
            })?;
            let Some(chunk) = chunk else { break };
            sink.write_all(&chunk)
                .await
                .map_err(|source| DiagError::Io {
                    path: path.into(),
                    source,
                })?;
            copied += chunk.len() as u64;
        }
        debug!(agent_id = %agent_id, path, bytes = copied, "downloaded");
        Ok(copied)
    }
}
