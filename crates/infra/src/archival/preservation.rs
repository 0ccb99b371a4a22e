use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use digiserv_jobs::{JobTracker, JobWork};

use super::ArchivalError;
use crate::collaborators::{PackageState, PreservationRegistry};

pub(super) struct SubmitPackage {
    pub(super) registry: Arc<dyn PreservationRegistry>,
    pub(super) package: String,
    pub(super) package_dir: PathBuf,
    pub(super) poll_interval: Duration,
    pub(super) max_polls: u32,
}

#[async_trait]
impl JobWork for SubmitPackage {
    type Error = ArchivalError;

    async fn run(&mut self, tracker: &JobTracker) -> Result<(), ArchivalError> {
        let path = self.package_dir.join(&self.package);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(ArchivalError::MissingPackage(path.display().to_string()));
        }

        self.registry.submit_package(&path).await?;
        tracker
            .info(format!("Submitted {} to the preservation registry", self.package))
            .await;

        for _ in 0..self.max_polls {
            tokio::time::sleep(self.poll_interval).await;
            let status = match self.registry.query_status(&self.package).await {
                Ok(status) => status,
                Err(e) => {
                    tracker.error(format!("Status check failed: {e}")).await;
                    continue;
                }
            };
            match status.status {
                PackageState::Success => {
                    let at = status
                        .processed_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "an unknown time".to_string());
                    tracker
                        .info(format!("{} preserved at {at}", self.package))
                        .await;
                    return Ok(());
                }
                state @ (PackageState::Failed | PackageState::Cancelled) => {
                    return Err(ArchivalError::Rejected {
                        package: self.package.clone(),
                        state,
                    });
                }
                PackageState::Pending | PackageState::Processing => {}
            }
        }

        Err(ArchivalError::Unfinished {
            package: self.package.clone(),
            polls: self.max_polls,
        })
    }
}
