//! Unit QA (with auto-publish) and staging directory QA.

use std::path::Path;

use tracing::debug;

use digiserv_jobs::JobTracker;
use digiserv_units::{
    AutoPublish, AvailabilityPolicy, StagedEntry, StagedImage, UnitContext, eligibility, inspect,
    qa_unit,
};

use super::{FinalizeError, FinalizeUnit};

impl FinalizeUnit {
    /// Run the unit QA rules and the auto-publish check, then approve the order.
    ///
    /// Returns the unit reloaded with whatever this phase changed.
    pub(super) async fn qa_unit(
        &self,
        tracker: &JobTracker,
        mut ctx: UnitContext,
    ) -> Result<UnitContext, FinalizeError> {
        let problems = qa_unit(&ctx);
        for problem in &problems {
            tracker.error(problem.to_string()).await;
        }

        if !ctx.unit.include_in_dl && !ctx.unit.reorder {
            self.auto_publish(tracker, &mut ctx).await?;
        }

        if !problems.is_empty() {
            return Err(FinalizeError::QaUnit { problems });
        }

        if !ctx.order.is_approved() {
            self.units().approve_order(ctx.order.id).await?;
            tracker
                .info(format!("Order {} approved", ctx.order.id))
                .await;
        }
        tracker.info("Unit passed QA").await;
        self.reload().await
    }

    async fn auto_publish(&self, tracker: &JobTracker, ctx: &mut UnitContext) -> Result<(), FinalizeError> {
        let catalog_key = match eligibility(ctx) {
            Ok(key) => key.to_string(),
            Err(reason) => {
                debug!(unit_id = %self.unit_id, %reason, "auto-publish not applicable");
                return Ok(());
            }
        };

        let year = match self.collaborators().catalog.publication_year(&catalog_key).await {
            Ok(Some(year)) => year,
            Ok(None) => {
                tracker
                    .info(format!("No publication year for catalog key {catalog_key}; skipping auto-publish"))
                    .await;
                return Ok(());
            }
            Err(e) => {
                tracker
                    .info(format!("Catalog lookup for {catalog_key} failed, skipping auto-publish: {e}"))
                    .await;
                return Ok(());
            }
        };

        let decision = AutoPublish::for_year(year);
        let Some(metadata) = ctx.metadata.as_mut() else {
            return Ok(());
        };
        if !decision.publishes() {
            tracker
                .info(format!("Published {year}; not eligible for auto-publish"))
                .await;
            return Ok(());
        }

        if decision.apply(&mut ctx.unit, metadata) {
            self.units()
                .set_availability_policy(metadata.id, AvailabilityPolicy::Public)
                .await?;
        }
        self.units().set_include_in_dl(ctx.unit.id, true).await?;
        tracker
            .info(format!("Published {year}; unit flagged for the digital library"))
            .await;
        Ok(())
    }

    /// Check the staging directory listing and return the images to import.
    pub(super) async fn qa_filesystem(
        &self,
        tracker: &JobTracker,
        staging: &Path,
    ) -> Result<Vec<StagedImage>, FinalizeError> {
        let entries = list_staging(staging).await?;
        let report = inspect(self.unit_id, &entries);
        if !report.is_clean() {
            for problem in &report.problems {
                tracker.error(problem.to_string()).await;
            }
            return Err(FinalizeError::QaFilesystem {
                problems: report.problems,
            });
        }
        tracker
            .info(format!("Staging directory passed QA with {} images", report.images.len()))
            .await;
        Ok(report.images)
    }
}

async fn list_staging(dir: &Path) -> Result<Vec<StagedEntry>, FinalizeError> {
    let io_err = |source| FinalizeError::Io {
        path: dir.display().to_string(),
        source,
    };
    let mut entries = Vec::new();
    let mut read = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    while let Some(entry) = read.next_entry().await.map_err(io_err)? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let meta = entry.metadata().await.map_err(io_err)?;
        if meta.is_dir() {
            entries.push(StagedEntry::dir(name));
        } else {
            entries.push(StagedEntry::file(name, meta.len()));
        }
    }
    Ok(entries)
}
