use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use digiserv_core::JobId;
use digiserv_infra::collaborators::{PackageState, PackageStatus};
use digiserv_jobs::{Event, EventLevel, JobState, JobStatus, Originator};

/// Default and ceiling of `GET /jobs?limit=`.
pub const DEFAULT_JOB_LIMIT: usize = 50;
pub const MAX_JOB_LIMIT: usize = 500;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub id: JobId,
    pub name: String,
    pub originator: Originator,
    pub status: JobState,
    pub failures: u32,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<JobStatus> for JobStatusView {
    fn from(job: JobStatus) -> Self {
        Self {
            id: job.id,
            name: job.name,
            originator: job.originator,
            status: job.status,
            failures: job.failures,
            error: job.error,
            started_at: job.started_at,
            ended_at: job.ended_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub id: i64,
    pub level: EventLevel,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl From<Event> for EventView {
    fn from(e: Event) -> Self {
        Self {
            id: e.id,
            level: e.level,
            text: e.text,
            created_at: e.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct JobListQuery {
    pub originator_type: Option<String>,
    pub originator_id: Option<i64>,
    pub limit: Option<usize>,
}

/// Body the OCR service posts when it finishes a unit.
#[derive(Debug, Deserialize)]
pub struct OcrCallbackRequest {
    pub status: OcrCallbackStatus,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrCallbackStatus {
    Success,
    Failure,
}

#[derive(Debug, Deserialize)]
pub struct FindingAidRequest {
    pub archival_object_uri: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageStatusView {
    pub package: String,
    pub status: PackageState,
    pub processed_at: Option<DateTime<Utc>>,
}

impl PackageStatusView {
    pub fn new(package: String, status: PackageStatus) -> Self {
        Self {
            package,
            status: status.status,
            processed_at: status.processed_at,
        }
    }
}
