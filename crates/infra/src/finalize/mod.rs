//! Unit finalization.
//!
//! `Finalizer::start` validates and claims the unit synchronously, creates the
//! `FinalizeUnit` Job Status and hands the work to `JobRunner`. The work then
//! runs these phases in order, stopping at the first error:
//!
//! 1. staging directory exists
//! 2. order finalization date (first attempt only)
//! 3. status `finalizing`
//! 4. unit QA, auto-publish, order approval
//! 5. staging directory QA
//! 6. import: master files, IIIF derivatives, archive
//! 7. OCR (optional, non-fatal)
//! 8. discovery publish (optional, non-fatal)
//! 9. patron deliverables (non digital-collection-building units)
//! 10. completion checks and project report
//! 11. cleanup
//!
//! Any error sets the unit to `error`; a later `start` resumes from there and
//! each phase skips work it finds already done.

mod complete;
mod deliverables;
mod import;
mod ocr;
pub mod orders;
mod publish;
mod qa;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use digiserv_core::{JobId, ProjectId, UnitId};
use digiserv_jobs::{JobRunner, JobStore, JobStoreError, JobTracker, JobWork, Originator};
use digiserv_units::{
    CompletionProblem, ExtractionError, FinalizeRejection, QaProblem, StagingProblem, UnitStatus,
};

use crate::collaborators::{CollaboratorError, Collaborators};
use crate::jobs::SpawnedJob;
use crate::units::{UnitStore, UnitStoreError};

/// Job name recorded on the Job Status of a finalization run.
pub const FINALIZE_UNIT: &str = "FinalizeUnit";

#[derive(Debug, Clone)]
pub struct FinalizeSettings {
    /// Parent of the per-unit staging directories.
    pub staging_root: PathBuf,
    /// Scratch space; each run gets its own directory below it.
    pub work_root: PathBuf,
    /// Public base URL of this service, used for OCR callbacks.
    pub service_url: String,
    /// Upper bound on concurrent IIIF batches.
    pub iiif_batches: usize,
    pub ocr_timeout: Duration,
}

/// Why a finalization request was refused. No job is created for any of these.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("unit {0} not found")]
    NotFound(UnitId),
    #[error(transparent)]
    Rejected(#[from] FinalizeRejection),
    #[error(transparent)]
    Store(#[from] UnitStoreError),
    #[error(transparent)]
    Job(#[from] JobStoreError),
}

/// A failure that ends a finalization run.
#[derive(Debug, thiserror::Error)]
pub enum FinalizeError {
    #[error("staging directory {0} does not exist")]
    MissingStagingDirectory(String),
    #[error("unit {0} no longer exists")]
    UnitVanished(UnitId),
    #[error("unit failed QA: {}", join(.problems))]
    QaUnit { problems: Vec<QaProblem> },
    #[error("staging directory failed QA: {}", join(.problems))]
    QaFilesystem { problems: Vec<StagingProblem> },
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("IIIF derivative generation failed for {failed} file(s)")]
    Iiif { failed: usize },
    #[error("archive checksum mismatch for {filename}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        filename: String,
        expected: String,
        actual: String,
    },
    #[error("unit has no intended use; cannot build patron deliverables")]
    MissingIntendedUse,
    #[error("unit is incomplete: {}", join(.problems))]
    Incomplete { problems: Vec<CompletionProblem> },
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    #[error(transparent)]
    Store(#[from] UnitStoreError),
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn join<T: core::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Entry point for finalization runs.
#[derive(Clone)]
pub struct Finalizer {
    jobs: Arc<dyn JobStore>,
    units: Arc<dyn UnitStore>,
    collaborators: Collaborators,
    settings: Arc<FinalizeSettings>,
}

impl Finalizer {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        units: Arc<dyn UnitStore>,
        collaborators: Collaborators,
        settings: FinalizeSettings,
    ) -> Self {
        Self {
            jobs,
            units,
            collaborators,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &FinalizeSettings {
        &self.settings
    }

    /// Validate and claim the unit, create its Job Status and start the run.
    #[instrument(skip_all, fields(unit_id = %unit_id), err)]
    pub async fn start(&self, unit_id: UnitId) -> Result<SpawnedJob, StartError> {
        let ctx = self
            .units
            .load_unit(unit_id)
            .await?
            .ok_or(StartError::NotFound(unit_id))?;
        ctx.unit.ensure_can_finalize()?;

        let Some(previous) = self.units.begin_finalization(unit_id).await? else {
            return Err(FinalizeRejection::AlreadyFinalizing(unit_id).into());
        };

        let job = match self.jobs.create(FINALIZE_UNIT, Originator::Unit(unit_id)).await {
            Ok(job) => job,
            Err(e) => {
                if let Err(revert) = self.units.set_unit_status(unit_id, previous).await {
                    warn!(%unit_id, error = %revert, "failed to release finalization claim");
                }
                return Err(e.into());
            }
        };
        info!(job_id = %job.id, %unit_id, resumed = previous == UnitStatus::Error, "finalization accepted");

        let work = FinalizeUnit {
            finalizer: self.clone(),
            job_id: job.id,
            unit_id,
            previous,
            project_id: ctx.unit.project_id,
            started: Instant::now(),
            run_dir: self
                .settings
                .work_root
                .join(ctx.unit.directory_name())
                .join(uuid::Uuid::now_v7().to_string()),
            project_notified: false,
        };
        let task = JobRunner::spawn(JobTracker::bound(self.jobs.clone(), job.id), work);
        Ok(SpawnedJob {
            job_id: job.id,
            task,
        })
    }
}

/// State of one finalization run.
struct FinalizeUnit {
    finalizer: Finalizer,
    job_id: JobId,
    unit_id: UnitId,
    /// Status the unit had before it was claimed.
    previous: UnitStatus,
    project_id: Option<ProjectId>,
    started: Instant,
    run_dir: PathBuf,
    /// Set once the project tracker has been told about a failure.
    project_notified: bool,
}

impl FinalizeUnit {
    fn units(&self) -> &dyn UnitStore {
        self.finalizer.units.as_ref()
    }

    fn collaborators(&self) -> &Collaborators {
        &self.finalizer.collaborators
    }

    fn settings(&self) -> &FinalizeSettings {
        &self.finalizer.settings
    }

    fn staging_dir(&self) -> PathBuf {
        self.settings()
            .staging_root
            .join(format!("{:09}", self.unit_id.get()))
    }

    fn minutes(&self) -> u64 {
        self.started.elapsed().as_secs() / 60
    }

    async fn reload(&self) -> Result<digiserv_units::UnitContext, FinalizeError> {
        self.units()
            .load_unit(self.unit_id)
            .await?
            .ok_or(FinalizeError::UnitVanished(self.unit_id))
    }

    async fn cleanup(&self) {
        match tokio::fs::remove_dir_all(&self.run_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(unit_id = %self.unit_id, path = %self.run_dir.display(), error = %e, "failed to remove working directory"),
        }
    }
}

#[async_trait]
impl JobWork for FinalizeUnit {
    type Error = FinalizeError;

    async fn run(&mut self, tracker: &JobTracker) -> Result<(), FinalizeError> {
        let staging = self.staging_dir();
        if !tokio::fs::try_exists(&staging).await.unwrap_or(false) {
            return Err(FinalizeError::MissingStagingDirectory(staging.display().to_string()));
        }
        tracker
            .info(format!("Finalizing unit {} from {}", self.unit_id, staging.display()))
            .await;

        let ctx = self.reload().await?;
        if self.previous == UnitStatus::Approved {
            self.units()
                .stamp_order(ctx.order.id, digiserv_units::OrderCheckpoint::FinalizationBegun)
                .await?;
        } else {
            tracker.info("Resuming finalization after a previous failure").await;
        }
        tracker
            .info(format!("Unit {} status is {}", self.unit_id, UnitStatus::Finalizing))
            .await;

        let ctx = self.qa_unit(tracker, ctx).await?;
        let images = self.qa_filesystem(tracker, &staging).await?;
        self.import(tracker, &ctx, &staging, &images).await?;

        if ctx.unit.ocr_master_files {
            self.ocr(tracker, &ctx).await;
        }

        let ctx = self.reload().await?;
        if ctx.unit.include_in_dl {
            self.publish(tracker, &ctx).await?;
        }
        if ctx.unit.needs_patron_deliverables() {
            self.deliverables(tracker, &ctx, &staging).await?;
        }

        self.complete(tracker).await?;
        self.cleanup().await;
        Ok(())
    }

    async fn on_failure(&mut self, tracker: &JobTracker, reason: &str) {
        if let Err(e) = self.units().set_unit_status(self.unit_id, UnitStatus::Error).await {
            warn!(unit_id = %self.unit_id, error = %e, "failed to set unit status to error");
        }
        if let (Some(project), false) = (self.project_id, self.project_notified) {
            self.project_notified = true;
            let minutes = self.minutes();
            if let Err(e) = self
                .collaborators()
                .projects
                .finalization_failed(project, self.unit_id, reason, minutes)
                .await
            {
                tracker
                    .error(format!("Failed to report finalization failure to project {project}: {e}"))
                    .await;
            }
        }
        self.cleanup().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::InMemoryCollaborators;
    use crate::units::InMemoryUnitStore;
    use digiserv_core::OrderId;
    use digiserv_jobs::{Event, EventLevel, InMemoryJobStore, JobStatus};
    use digiserv_units::{Order, OrderStatus, Unit};

    fn settings() -> FinalizeSettings {
        FinalizeSettings {
            staging_root: PathBuf::from("/nonexistent/staging"),
            work_root: std::env::temp_dir(),
            service_url: "http://localhost:8080".to_string(),
            iiif_batches: 2,
            ocr_timeout: Duration::from_secs(1),
        }
    }

    fn store_with(unit: Unit) -> Arc<InMemoryUnitStore> {
        let units = InMemoryUnitStore::arc();
        units.insert_order(Order::new(unit.order_id, OrderStatus::Approved));
        units.insert_unit(unit);
        units
    }

    fn finalizer(jobs: Arc<dyn JobStore>, units: Arc<InMemoryUnitStore>) -> Finalizer {
        Finalizer::new(jobs, units, InMemoryCollaborators::new().collaborators(), settings())
    }

    #[tokio::test]
    async fn rejections_create_no_job() {
        let cases = [
            (
                Unit {
                    reorder: true,
                    ..Unit::approved(UnitId::new(1), OrderId::new(1))
                },
                "re-order",
            ),
            (
                Unit {
                    status: UnitStatus::Finalizing,
                    ..Unit::approved(UnitId::new(1), OrderId::new(1))
                },
                "already finalizing",
            ),
            (
                Unit {
                    status: UnitStatus::Done,
                    ..Unit::approved(UnitId::new(1), OrderId::new(1))
                },
                "only approved or error",
            ),
        ];
        for (unit, expected) in cases {
            let jobs = InMemoryJobStore::arc();
            let f = finalizer(jobs.clone(), store_with(unit));
            let err = f.start(UnitId::new(1)).await.unwrap_err();
            assert!(matches!(err, StartError::Rejected(_)));
            assert!(err.to_string().contains(expected), "{err}");
            assert!(jobs.list(None, 10).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn unknown_unit_is_not_found() {
        let jobs = InMemoryJobStore::arc();
        let f = finalizer(jobs.clone(), InMemoryUnitStore::arc());
        let err = f.start(UnitId::new(9)).await.unwrap_err();
        assert!(matches!(err, StartError::NotFound(id) if id == UnitId::new(9)));
        assert!(jobs.list(None, 10).await.unwrap().is_empty());
    }

    struct UnavailableJobStore;

    #[async_trait]
    impl JobStore for UnavailableJobStore {
        async fn create(&self, _: &str, _: Originator) -> Result<JobStatus, JobStoreError> {
            Err(JobStoreError::Storage("database is down".to_string()))
        }
        async fn get(&self, _: JobId) -> Result<Option<JobStatus>, JobStoreError> {
            Ok(None)
        }
        async fn list(&self, _: Option<Originator>, _: usize) -> Result<Vec<JobStatus>, JobStoreError> {
            Ok(Vec::new())
        }
        async fn events(&self, id: JobId) -> Result<Vec<Event>, JobStoreError> {
            Err(JobStoreError::NotFound(id))
        }
        async fn append_event(&self, id: JobId, _: EventLevel, _: &str) -> Result<(), JobStoreError> {
            Err(JobStoreError::NotFound(id))
        }
        async fn finish(&self, id: JobId) -> Result<bool, JobStoreError> {
            Err(JobStoreError::NotFound(id))
        }
    }

    #[tokio::test]
    async fn failed_job_creation_releases_the_claim() {
        let units = store_with(Unit {
            status: UnitStatus::Error,
            ..Unit::approved(UnitId::new(4), OrderId::new(1))
        });
        let f = finalizer(Arc::new(UnavailableJobStore), units.clone());

        let err = f.start(UnitId::new(4)).await.unwrap_err();
        assert!(matches!(err, StartError::Job(_)));
        let unit = units.load_unit(UnitId::new(4)).await.unwrap().unwrap().unit;
        assert_eq!(unit.status, UnitStatus::Error);
    }

    #[tokio::test]
    async fn missing_staging_directory_fails_the_job() {
        let jobs = InMemoryJobStore::arc();
        let units = store_with(Unit::approved(UnitId::new(3), OrderId::new(1)));
        let f = finalizer(jobs.clone(), units.clone());

        let spawned = f.start(UnitId::new(3)).await.unwrap();
        spawned.task.await.unwrap();

        let job = jobs.get(spawned.job_id).await.unwrap().unwrap();
        assert_eq!(job.status, digiserv_jobs::JobState::Failure);
        assert!(job.error.unwrap().contains("staging directory"));
        let unit = units.load_unit(UnitId::new(3)).await.unwrap().unwrap().unit;
        assert_eq!(unit.status, UnitStatus::Error);
    }
}
