use digiserv_jobs::JobTracker;
use digiserv_units::{UnitStatus, completion_problems};

use super::{FinalizeError, FinalizeUnit, join};

impl FinalizeUnit {
    /// Check the reloaded unit and close it out, directly or through its project.
    pub(super) async fn complete(&mut self, tracker: &JobTracker) -> Result<(), FinalizeError> {
        let ctx = self.reload().await?;
        let master_files = self.units().master_files(self.unit_id).await?;
        let problems = completion_problems(&ctx, &master_files);
        let minutes = self.minutes();

        let Some(project) = self.project_id else {
            if !problems.is_empty() {
                return Err(FinalizeError::Incomplete { problems });
            }
            self.units()
                .set_unit_status(self.unit_id, UnitStatus::Done)
                .await?;
            tracker
                .info(format!("Unit {} finalized in {minutes} minutes", self.unit_id))
                .await;
            return Ok(());
        };

        if !problems.is_empty() {
            self.project_notified = true;
            let reason = join(&problems);
            if let Err(e) = self
                .collaborators()
                .projects
                .finalization_failed(project, self.unit_id, &reason, minutes)
                .await
            {
                tracker
                    .error(format!("Failed to report incomplete unit to project {project}: {e}"))
                    .await;
            }
            return Err(FinalizeError::Incomplete { problems });
        }

        self.collaborators()
            .projects
            .finalization_succeeded(project, self.unit_id, minutes)
            .await?;
        tracker
            .info(format!(
                "Unit {} finalized in {minutes} minutes; project {project} notified",
                self.unit_id
            ))
            .await;
        Ok(())
    }
}
