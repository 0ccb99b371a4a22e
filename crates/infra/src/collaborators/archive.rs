//! Long-term archival storage of master images.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use digiserv_core::UnitId;

use super::CollaboratorError;
use super::checksum::sha256_file;

#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Copy `source` into the unit's archive directory. Returns the checksum of the stored copy.
    async fn put(&self, source: &Path, unit: UnitId, filename: &str) -> Result<String, CollaboratorError>;

    async fn remove(&self, unit: UnitId, filename: &str) -> Result<(), CollaboratorError>;

    /// Rename an archived file, refusing if its checksum is not `expected_checksum`.
    async fn rename(
        &self,
        unit: UnitId,
        old: &str,
        new: &str,
        expected_checksum: &str,
    ) -> Result<(), CollaboratorError>;
}

/// Archive laid out as `<root>/<unit id, 9 digits>/<filename>`.
#[derive(Debug, Clone)]
pub struct FsArchiveStore {
    root: PathBuf,
}

impl FsArchiveStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn unit_dir(&self, unit: UnitId) -> PathBuf {
        self.root.join(format!("{:09}", unit.get()))
    }
}

#[async_trait]
impl ArchiveStore for FsArchiveStore {
    async fn put(&self, source: &Path, unit: UnitId, filename: &str) -> Result<String, CollaboratorError> {
        let dir = self.unit_dir(unit);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CollaboratorError::io("archive", &dir, e))?;

        // Copy under a temporary name so a half-written file never carries the real name.
        let dest = dir.join(filename);
        let partial = dir.join(format!(".{filename}.partial"));
        tokio::fs::copy(source, &partial)
            .await
            .map_err(|e| CollaboratorError::io("archive", source, e))?;
        tokio::fs::rename(&partial, &dest)
            .await
            .map_err(|e| CollaboratorError::io("archive", &dest, e))?;

        let checksum = sha256_file(&dest).await?;
        info!(unit_id = %unit, filename, "archived master file");
        Ok(checksum)
    }

    async fn remove(&self, unit: UnitId, filename: &str) -> Result<(), CollaboratorError> {
        let path = self.unit_dir(unit).join(filename);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CollaboratorError::io("archive remove", &path, e)),
        }
    }

    async fn rename(
        &self,
        unit: UnitId,
        old: &str,
        new: &str,
        expected_checksum: &str,
    ) -> Result<(), CollaboratorError> {
        let dir = self.unit_dir(unit);
        let from = dir.join(old);
        let actual = sha256_file(&from).await?;
        if actual != expected_checksum {
            return Err(CollaboratorError::invalid(
                "archive rename",
                from.display().to_string(),
                format!("checksum {actual} does not match {expected_checksum}"),
            ));
        }
        let to = dir.join(new);
        tokio::fs::rename(&from, &to)
            .await
            .map_err(|e| CollaboratorError::io("archive rename", &from, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_copies_and_reports_checksum() {
        let staging = tempfile::tempdir().unwrap();
        let archive_root = tempfile::tempdir().unwrap();
        let source = staging.path().join("000000001_0001.tif");
        std::fs::write(&source, b"abc").unwrap();

        let store = FsArchiveStore::new(archive_root.path());
        let checksum = store.put(&source, UnitId::new(1), "000000001_0001.tif").await.unwrap();

        assert_eq!(checksum, sha256_file(&source).await.unwrap());
        assert!(archive_root.path().join("000000001/000000001_0001.tif").exists());
    }

    #[tokio::test]
    async fn rename_checks_checksum() {
        let archive_root = tempfile::tempdir().unwrap();
        let store = FsArchiveStore::new(archive_root.path());
        let dir = store.unit_dir(UnitId::new(2));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.tif"), b"abc").unwrap();

        assert!(store.rename(UnitId::new(2), "a.tif", "b.tif", "bogus").await.is_err());
        let good = sha256_file(&dir.join("a.tif")).await.unwrap();
        store.rename(UnitId::new(2), "a.tif", "b.tif", &good).await.unwrap();
        assert!(dir.join("b.tif").exists());

        store.remove(UnitId::new(2), "b.tif").await.unwrap();
        store.remove(UnitId::new(2), "b.tif").await.unwrap();
    }
}
