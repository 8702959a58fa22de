//! BundleStore port - where bundle artifacts are written.

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::error::DiagError;

/// Open artifact being streamed into the bundle.
pub type ArtifactWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// BundleStore persists artifacts under bundle-relative paths.
///
/// # Paths
/// - always `/`-separated and relative (`tasks/<task_id>/stdout`)
/// - each artifact has its own deterministic name; writes never collide
/// - writing the same path twice replaces the contents
#[async_trait]
pub trait BundleStore: Send + Sync {
    async fn write(&self, relative_path: &str, contents: &[u8]) -> Result<(), DiagError>;

    /// Open `relative_path` for streaming, truncating any earlier contents.
    /// Callers shut the writer down once the last chunk is written.
    async fn open(&self, relative_path: &str) -> Result<ArtifactWriter, DiagError>;
}
