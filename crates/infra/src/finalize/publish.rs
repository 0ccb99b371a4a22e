use digiserv_jobs::JobTracker;
use digiserv_units::{UnitCheckpoint, UnitContext};

use super::{FinalizeError, FinalizeUnit};
use crate::collaborators::ReindexTarget;

impl FinalizeUnit {
    /// Push the unit to discovery. A reindex failure is logged and tolerated;
    /// store failures are not.
    pub(super) async fn publish(&self, tracker: &JobTracker, ctx: &UnitContext) -> Result<(), FinalizeError> {
        let Some(metadata) = ctx.metadata.as_ref() else {
            tracker.error("Unit is flagged for the digital library but has no metadata").await;
            return Ok(());
        };

        let target = ReindexTarget::Pid(metadata.pid.clone());
        if let Err(e) = self.collaborators().reindex.reindex(&target).await {
            tracker.error(format!("Publish of {target} failed: {e}")).await;
            return Ok(());
        }

        self.units()
            .stamp_unit(self.unit_id, UnitCheckpoint::DlDeliverablesReady)
            .await?;
        self.units().stamp_metadata_dl_ingest(metadata.id).await?;
        tracker.info(format!("Published {target} to discovery")).await;
        Ok(())
    }
}
