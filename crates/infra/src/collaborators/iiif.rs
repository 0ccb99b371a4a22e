//! IIIF derivative storage.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::CollaboratorError;
use super::command;

#[async_trait]
pub trait IiifStore: Send + Sync {
    async fn exists(&self, id: &str) -> Result<bool, CollaboratorError>;

    /// Generate and store the derivative of `source` under `id`.
    async fn publish(&self, source: &Path, id: &str, overwrite: bool) -> Result<(), CollaboratorError>;

    async fn remove(&self, id: &str) -> Result<(), CollaboratorError>;
}

/// Derivatives written as JPEG 2000 files below `root` by an external converter.
#[derive(Debug, Clone)]
pub struct FsIiifStore {
    root: PathBuf,
    converter: String,
}

impl FsIiifStore {
    pub fn new(root: impl Into<PathBuf>, converter: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            converter: converter.into(),
        }
    }

    /// `tsm:1234` is stored as `<root>/tsm/1234.jp2`.
    pub fn path_for(&self, id: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in id.split(':').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path.set_extension("jp2");
        path
    }
}

#[async_trait]
impl IiifStore for FsIiifStore {
    async fn exists(&self, id: &str) -> Result<bool, CollaboratorError> {
        tokio::fs::try_exists(self.path_for(id))
            .await
            .map_err(|e| CollaboratorError::io("iiif exists", &self.path_for(id), e))
    }

    async fn publish(&self, source: &Path, id: &str, overwrite: bool) -> Result<(), CollaboratorError> {
        let dest = self.path_for(id);
        if !overwrite && self.exists(id).await? {
            return Ok(());
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CollaboratorError::io("iiif publish", parent, e))?;
        }

        let partial = dest.with_extension("partial.jp2");
        command::run(
            "iiif publish",
            &self.converter,
            [source.as_os_str(), partial.as_os_str()],
        )
        .await?;
        tokio::fs::rename(&partial, &dest)
            .await
            .map_err(|e| CollaboratorError::io("iiif publish", &dest, e))
    }

    async fn remove(&self, id: &str) -> Result<(), CollaboratorError> {
        let path = self.path_for(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CollaboratorError::io("iiif remove", &path, e)),
        }
    }
}
