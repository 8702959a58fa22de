//! LocalBundleStore - writes the bundle into a directory on disk.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::error::DiagError;
use crate::ports::{ArtifactWriter, BundleStore};

#[derive(Debug, Clone)]
pub struct LocalBundleStore {
    root: PathBuf,
}

impl LocalBundleStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Join `relative_path` under the root, refusing anything that would
    /// leave it.
    fn resolve(&self, relative_path: &str) -> Result<PathBuf, DiagError> {
        let relative = Path::new(relative_path);
        let contained = !relative_path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !contained {
            return Err(DiagError::Io {
                path: relative.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "bundle paths must be relative and stay inside the bundle",
                ),
            });
        }
        Ok(self.root.join(relative))
    }

    async fn create_parent(path: &Path) -> Result<(), DiagError> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| DiagError::Io {
                path: parent.to_path_buf(),
                source,
            })
    }
}

#[async_trait]
impl BundleStore for LocalBundleStore {
    async fn write(&self, relative_path: &str, contents: &[u8]) -> Result<(), DiagError> {
        let path = self.resolve(relative_path)?;
        Self::create_parent(&path).await?;
        tokio::fs::write(&path, contents)
            .await
            .map_err(|source| DiagError::Io { path, source })
    }

    async fn open(&self, relative_path: &str) -> Result<ArtifactWriter, DiagError> {
        let path = self.resolve(relative_path)?;
        Self::create_parent(&path).await?;
        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|source| DiagError::Io { path, source })?;
        Ok(Box::new(file))
    }
}
