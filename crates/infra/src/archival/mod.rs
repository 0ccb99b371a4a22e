//! Metadata-level archival jobs: preservation package submission and
//! finding-aid linkage.

mod finding_aid;
mod preservation;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument};

use digiserv_core::MetadataId;
use digiserv_jobs::{JobRunner, JobStore, JobStoreError, JobTracker, Originator};
use digiserv_units::Metadata;

use crate::collaborators::{CollaboratorError, Collaborators, PackageState, PackageStatus};
use crate::jobs::SpawnedJob;
use crate::units::{UnitStore, UnitStoreError};

use finding_aid::PublishToFindingAid;
use preservation::SubmitPackage;

pub const SUBMIT_PRESERVATION_PACKAGE: &str = "SubmitPreservationPackage";
pub const PUBLISH_TO_FINDING_AID: &str = "PublishToFindingAid";

#[derive(Debug, Clone)]
pub struct ArchivalSettings {
    /// Directory holding prepared `<pid>.tar` preservation packages.
    pub package_dir: PathBuf,
    pub poll_interval: Duration,
    pub max_polls: u32,
    /// Base URL of the IIIF manifest service; the pid is appended.
    pub iiif_manifest_url: String,
}

/// Why an archival job could not be started or queried.
#[derive(Debug, thiserror::Error)]
pub enum ArchivalStartError {
    #[error("metadata {0} not found")]
    NotFound(MetadataId),
    #[error(transparent)]
    Store(#[from] UnitStoreError),
    #[error(transparent)]
    Job(#[from] JobStoreError),
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

#[derive(Debug, thiserror::Error)]
pub enum ArchivalError {
    #[error("preservation package {0} does not exist")]
    MissingPackage(String),
    #[error("preservation package {package} ended as {state:?}")]
    Rejected { package: String, state: PackageState },
    #[error("preservation package {package} not processed after {polls} status checks")]
    Unfinished { package: String, polls: u32 },
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

/// File name of the preservation package prepared for a metadata record.
pub fn package_name(pid: &str) -> String {
    format!("{}.tar", pid.replace(':', "_"))
}

#[derive(Clone)]
pub struct ArchivalJobs {
    jobs: Arc<dyn JobStore>,
    units: Arc<dyn UnitStore>,
    collaborators: Collaborators,
    settings: Arc<ArchivalSettings>,
}

impl ArchivalJobs {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        units: Arc<dyn UnitStore>,
        collaborators: Collaborators,
        settings: ArchivalSettings,
    ) -> Self {
        Self {
            jobs,
            units,
            collaborators,
            settings: Arc::new(settings),
        }
    }

    async fn metadata(&self, id: MetadataId) -> Result<Metadata, ArchivalStartError> {
        self.units
            .metadata(id)
            .await?
            .ok_or(ArchivalStartError::NotFound(id))
    }

    /// Submit the metadata record's preservation package and follow it to completion.
    #[instrument(skip_all, fields(metadata_id = %id), err)]
    pub async fn submit_preservation(&self, id: MetadataId) -> Result<SpawnedJob, ArchivalStartError> {
        let metadata = self.metadata(id).await?;
        let job = self
            .jobs
            .create(SUBMIT_PRESERVATION_PACKAGE, Originator::Metadata(id))
            .await?;
        info!(job_id = %job.id, pid = %metadata.pid, "preservation submission accepted");

        let work = SubmitPackage {
            registry: self.collaborators.preservation.clone(),
            package: package_name(&metadata.pid),
            package_dir: self.settings.package_dir.clone(),
            poll_interval: self.settings.poll_interval,
            max_polls: self.settings.max_polls,
        };
        let task = JobRunner::spawn(JobTracker::bound(self.jobs.clone(), job.id), work);
        Ok(SpawnedJob {
            job_id: job.id,
            task,
        })
    }

    /// Current registry status of the metadata record's preservation package.
    pub async fn preservation_status(&self, id: MetadataId) -> Result<PackageStatus, ArchivalStartError> {
        let metadata = self.metadata(id).await?;
        Ok(self
            .collaborators
            .preservation
            .query_status(&package_name(&metadata.pid))
            .await?)
    }

    /// Link the metadata record's digital object to an archival object.
    #[instrument(skip_all, fields(metadata_id = %id), err)]
    pub async fn publish_to_finding_aid(
        &self,
        id: MetadataId,
        archival_object_uri: String,
    ) -> Result<SpawnedJob, ArchivalStartError> {
        let metadata = self.metadata(id).await?;
        let job = self
            .jobs
            .create(PUBLISH_TO_FINDING_AID, Originator::Metadata(id))
            .await?;
        info!(job_id = %job.id, pid = %metadata.pid, %archival_object_uri, "finding aid publication accepted");

        let manifest_url = format!(
            "{}/{}",
            self.settings.iiif_manifest_url.trim_end_matches('/'),
            metadata.pid
        );
        let work = PublishToFindingAid {
            service: self.collaborators.finding_aid.clone(),
            archival_object_uri,
            pid: metadata.pid,
            title: metadata.title,
            manifest_url,
        };
        let task = JobRunner::spawn(JobTracker::bound(self.jobs.clone(), job.id), work);
        Ok(SpawnedJob {
            job_id: job.id,
            task,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{ArchivalObject, InMemoryCollaborators};
    use crate::units::InMemoryUnitStore;
    use digiserv_jobs::{EventLevel, InMemoryJobStore, JobState};
    use digiserv_units::MetadataKind;

    struct Harness {
        jobs: Arc<InMemoryJobStore>,
        fakes: InMemoryCollaborators,
        archival: ArchivalJobs,
        packages: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let jobs = InMemoryJobStore::arc();
        let units = InMemoryUnitStore::arc();
        units.insert_metadata(Metadata::new(
            MetadataId::new(5),
            "uva-lib:5",
            "Letters home",
            MetadataKind::Xml,
        ));
        let fakes = InMemoryCollaborators::new();
        let packages = tempfile::tempdir().unwrap();
        let archival = ArchivalJobs::new(
            jobs.clone(),
            units,
            fakes.collaborators(),
            ArchivalSettings {
                package_dir: packages.path().to_path_buf(),
                poll_interval: Duration::from_millis(1),
                max_polls: 3,
                iiif_manifest_url: "https://iiif.example.edu/pid/".to_string(),
            },
        );
        Harness {
            jobs,
            fakes,
            archival,
            packages,
        }
    }

    async fn finished(h: &Harness, spawned: SpawnedJob) -> digiserv_jobs::JobStatus {
        spawned.task.await.unwrap();
        h.jobs.get(spawned.job_id).await.unwrap().unwrap()
    }

    #[test]
    fn package_names_replace_colons() {
        assert_eq!(package_name("uva-lib:5"), "uva-lib_5.tar");
    }

    #[tokio::test]
    async fn accepted_package_finishes_the_job() {
        let h = harness();
        std::fs::write(h.packages.path().join("uva-lib_5.tar"), b"bag").unwrap();
        h.fakes.preservation.script(
            "uva-lib_5.tar",
            vec![PackageState::Pending, PackageState::Processing, PackageState::Success],
        );

        let spawned = h.archival.submit_preservation(MetadataId::new(5)).await.unwrap();
        let job = finished(&h, spawned).await;
        assert_eq!(job.status, JobState::Finished);
        assert_eq!(h.fakes.preservation.submitted(), vec!["uva-lib_5.tar".to_string()]);
    }

    #[tokio::test]
    async fn failed_or_stalled_packages_fail_the_job() {
        let h = harness();
        std::fs::write(h.packages.path().join("uva-lib_5.tar"), b"bag").unwrap();

        h.fakes
            .preservation
            .script("uva-lib_5.tar", vec![PackageState::Processing, PackageState::Failed]);
        let spawned = h.archival.submit_preservation(MetadataId::new(5)).await.unwrap();
        let job = finished(&h, spawned).await;
        assert_eq!(job.status, JobState::Failure);
        assert!(job.error.unwrap().contains("Failed"));

        h.fakes
            .preservation
            .script("uva-lib_5.tar", vec![PackageState::Processing]);
        let spawned = h.archival.submit_preservation(MetadataId::new(5)).await.unwrap();
        let job = finished(&h, spawned).await;
        assert_eq!(job.status, JobState::Failure);
        assert!(job.error.unwrap().contains("after 3 status checks"));
    }

    #[tokio::test]
    async fn missing_package_is_fatal() {
        let h = harness();
        let spawned = h.archival.submit_preservation(MetadataId::new(5)).await.unwrap();
        let job = finished(&h, spawned).await;
        assert_eq!(job.status, JobState::Failure);
        assert!(h.fakes.preservation.submitted().is_empty());
    }

    #[tokio::test]
    async fn unknown_metadata_creates_no_job() {
        let h = harness();
        let err = h.archival.submit_preservation(MetadataId::new(99)).await.unwrap_err();
        assert!(matches!(err, ArchivalStartError::NotFound(_)));
        assert!(h.jobs.list(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn finding_aid_link_is_created_once() {
        let h = harness();
        h.fakes.finding_aid.insert_archival_object(ArchivalObject {
            uri: "/repositories/3/archival_objects/12".to_string(),
            title: "Box 4, Folder 2".to_string(),
            repository: "/repositories/3".to_string(),
        });

        for _ in 0..2 {
            let spawned = h
                .archival
                .publish_to_finding_aid(
                    MetadataId::new(5),
                    "/repositories/3/archival_objects/12".to_string(),
                )
                .await
                .unwrap();
            let job = finished(&h, spawned).await;
            assert_eq!(job.status, JobState::Finished);
        }
        assert_eq!(h.fakes.finding_aid.created_count(), 1);
        assert_eq!(h.fakes.finding_aid.links().len(), 1);
    }

    #[tokio::test]
    async fn unknown_archival_object_fails_the_job() {
        let h = harness();
        let spawned = h
            .archival
            .publish_to_finding_aid(MetadataId::new(5), "/repositories/3/archival_objects/404".to_string())
            .await
            .unwrap();
        let id = spawned.job_id;
        let job = finished(&h, spawned).await;
        assert_eq!(job.status, JobState::Failure);
        let events = h.jobs.events(id).await.unwrap();
        assert_eq!(events.last().unwrap().level, EventLevel::Fatal);
    }
}
