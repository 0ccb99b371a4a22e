//! Master file import, IIIF derivatives and archiving.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::task::JoinSet;
use tracing::debug;

use digiserv_jobs::JobTracker;
use digiserv_units::{MasterFile, NewMasterFile, StagedImage, UnitCheckpoint, UnitContext};

use super::{FinalizeError, FinalizeUnit, orders};
use crate::collaborators::checksum::sha256_file;

impl FinalizeUnit {
    pub(super) async fn import(
        &self,
        tracker: &JobTracker,
        ctx: &UnitContext,
        staging: &Path,
        images: &[StagedImage],
    ) -> Result<(), FinalizeError> {
        let files = self.import_master_files(tracker, staging, images).await?;
        self.publish_iiif(tracker, staging, &files).await?;

        if ctx.unit.throw_away {
            tracker.info("Unit is throw away; not archiving").await;
            return Ok(());
        }
        self.archive(tracker, ctx, staging, &files).await
    }

    /// Create or refresh one master file per staged image.
    async fn import_master_files(
        &self,
        tracker: &JobTracker,
        staging: &Path,
        images: &[StagedImage],
    ) -> Result<Vec<MasterFile>, FinalizeError> {
        let mut existing: HashMap<String, MasterFile> = self
            .units()
            .master_files(self.unit_id)
            .await?
            .into_iter()
            .map(|mf| (mf.filename.clone(), mf))
            .collect();

        let mut created = 0;
        let mut files = Vec::with_capacity(images.len());
        for image in images {
            let path = staging.join(&image.filename);
            let tech_meta = self.collaborators().tech_meta.extract(&path).await?;
            tech_meta.validate(&image.filename)?;
            let checksum = sha256_file(&path).await?;

            let file = match existing.remove(&image.filename) {
                Some(mut mf) => {
                    if mf.checksum != checksum {
                        // Content changed since the last attempt; archive it again.
                        mf.date_archived = None;
                    }
                    mf.title = Some(image.title());
                    mf.filesize = image.size;
                    mf.checksum = checksum;
                    mf.tech_meta = Some(tech_meta);
                    self.units().update_master_file(&mf).await?;
                    mf
                }
                None => {
                    created += 1;
                    self.units()
                        .create_master_file(NewMasterFile {
                            unit_id: self.unit_id,
                            filename: image.filename.clone(),
                            title: image.title(),
                            filesize: image.size,
                            checksum,
                            tech_meta,
                        })
                        .await?
                }
            };
            files.push(file);
        }

        tracker
            .info(format!(
                "Imported {} master files ({created} new)",
                files.len()
            ))
            .await;
        Ok(files)
    }

    /// Generate missing IIIF derivatives in concurrent batches.
    async fn publish_iiif(
        &self,
        tracker: &JobTracker,
        staging: &Path,
        files: &[MasterFile],
    ) -> Result<(), FinalizeError> {
        if files.is_empty() {
            return Ok(());
        }
        let batches = self.settings().iiif_batches.max(1);
        let batch_size = files.len().div_ceil(batches);

        let mut set = JoinSet::new();
        for batch in files.chunks(batch_size) {
            let iiif = self.collaborators().iiif.clone();
            let work: Vec<(PathBuf, String)> = batch
                .iter()
                .map(|mf| (staging.join(&mf.filename), mf.iiif_id().to_string()))
                .collect();
            set.spawn(async move {
                let mut failures = Vec::new();
                for (path, id) in work {
                    let published = match iiif.exists(&id).await {
                        Ok(true) => continue,
                        Ok(false) => iiif.publish(&path, &id, false).await,
                        Err(e) => Err(e),
                    };
                    if let Err(e) = published {
                        failures.push(format!("IIIF derivative for {id} failed: {e}"));
                    }
                }
                failures
            });
        }

        let mut failed = 0;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(failures) => {
                    for failure in failures {
                        tracker.error(failure).await;
                        failed += 1;
                    }
                }
                Err(e) => {
                    tracker.error(format!("IIIF batch aborted: {e}")).await;
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            return Err(FinalizeError::Iiif { failed });
        }
        tracker.info("IIIF derivatives are up to date").await;
        Ok(())
    }

    async fn archive(
        &self,
        tracker: &JobTracker,
        ctx: &UnitContext,
        staging: &Path,
        files: &[MasterFile],
    ) -> Result<(), FinalizeError> {
        let mut archived = 0;
        for mf in files.iter().filter(|mf| !mf.is_archived()) {
            let actual = self
                .collaborators()
                .archive
                .put(&staging.join(&mf.filename), self.unit_id, &mf.filename)
                .await?;
            if actual != mf.checksum {
                return Err(FinalizeError::ChecksumMismatch {
                    filename: mf.filename.clone(),
                    expected: mf.checksum.clone(),
                    actual,
                });
            }
            self.units().mark_master_file_archived(mf.id).await?;
            archived += 1;
        }
        debug!(unit_id = %self.unit_id, archived, "master files archived");

        self.units()
            .stamp_unit(self.unit_id, UnitCheckpoint::Archived)
            .await?;
        tracker
            .info(format!("Archived {archived} master files"))
            .await;
        orders::check_archive_complete(self.units(), tracker, ctx.order.id).await?;
        Ok(())
    }
}
