use std::path::Path;

use digiserv_jobs::JobTracker;
use digiserv_units::{UnitCheckpoint, UnitContext};

use super::{FinalizeError, FinalizeUnit, orders};
use crate::collaborators::DeliverableRequest;

impl FinalizeUnit {
    /// Build the patron deliverable in the intended use's format.
    pub(super) async fn deliverables(
        &self,
        tracker: &JobTracker,
        ctx: &UnitContext,
        staging: &Path,
    ) -> Result<(), FinalizeError> {
        let intended_use = ctx
            .intended_use
            .as_ref()
            .ok_or(FinalizeError::MissingIntendedUse)?;

        tokio::fs::create_dir_all(&self.run_dir)
            .await
            .map_err(|source| FinalizeError::Io {
                path: self.run_dir.display().to_string(),
                source,
            })?;

        let images = self
            .units()
            .master_files(self.unit_id)
            .await?
            .into_iter()
            .map(|mf| staging.join(mf.filename))
            .collect();
        let request = DeliverableRequest {
            unit_id: self.unit_id,
            order_id: ctx.order.id,
            format: intended_use.deliverable_format,
            images,
            work_dir: self.run_dir.clone(),
        };
        let delivered = self.collaborators().deliverables.build(&request).await?;

        self.units()
            .stamp_unit(self.unit_id, UnitCheckpoint::PatronDeliverablesReady)
            .await?;
        tracker
            .info(format!(
                "Patron {} deliverable written to {}",
                intended_use.deliverable_format.as_str(),
                delivered.display()
            ))
            .await;
        orders::check_deliverables_complete(self.units(), tracker, ctx.order.id).await?;
        Ok(())
    }
}
