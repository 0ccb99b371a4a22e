//! Job storage abstraction and the in-memory implementation.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use digiserv_core::JobId;

use crate::event::{Event, EventLevel};
use crate::job::{JobStatus, Originator};

/// Text of the Info event appended by a successful `finish`.
pub const JOB_FINISHED: &str = "job finished";

/// Persistence for Job Statuses and their event logs.
///
/// Every method is one atomic write from the caller's point of view: an
/// `Error` event and its failure-counter increment, or a `Fatal` event and
/// its terminal transition, are never observed separately.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new running job.
    async fn create(&self, name: &str, originator: Originator) -> Result<JobStatus, JobStoreError>;

    /// Get a job by ID.
    async fn get(&self, id: JobId) -> Result<Option<JobStatus>, JobStoreError>;

    /// List jobs, newest first, optionally restricted to one originator.
    async fn list(
        &self,
        originator: Option<Originator>,
        limit: usize,
    ) -> Result<Vec<JobStatus>, JobStoreError>;

    /// Events of a job in creation order.
    async fn events(&self, id: JobId) -> Result<Vec<Event>, JobStoreError>;

    /// Append an event.
    ///
    /// - `Error` also increments the job's failure counter.
    /// - `Fatal` also ends the job as `failure` with `text` as its error,
    ///   unless the job has already ended.
    async fn append_event(&self, id: JobId, level: EventLevel, text: &str)
        -> Result<(), JobStoreError>;

    /// End the job as `finished` and append the "job finished" event.
    ///
    /// Returns `false` without writing anything if the job had already ended.
    async fn finish(&self, id: JobId) -> Result<bool, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Default)]
struct State {
    last_job_id: i64,
    last_event_id: i64,
    jobs: BTreeMap<JobId, JobStatus>,
    events: Vec<Event>,
}

impl State {
    fn push_event(&mut self, job_id: JobId, level: EventLevel, text: &str) {
        self.last_event_id += 1;
        self.events.push(Event {
            id: self.last_event_id,
            job_id,
            level,
            text: text.to_string(),
            created_at: Utc::now(),
        });
    }
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    state: RwLock<State>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn poisoned() -> JobStoreError {
        JobStoreError::Storage("job store lock poisoned".to_string())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, name: &str, originator: Originator) -> Result<JobStatus, JobStoreError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        state.last_job_id += 1;
        let job = JobStatus::started(JobId::new(state.last_job_id), name, originator, Utc::now());
        state.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: JobId) -> Result<Option<JobStatus>, JobStoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state.jobs.get(&id).cloned())
    }

    async fn list(
        &self,
        originator: Option<Originator>,
        limit: usize,
    ) -> Result<Vec<JobStatus>, JobStoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state
            .jobs
            .values()
            .rev()
            .filter(|j| originator.map_or(true, |o| j.originator == o))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn events(&self, id: JobId) -> Result<Vec<Event>, JobStoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        if !state.jobs.contains_key(&id) {
            return Err(JobStoreError::NotFound(id));
        }
        Ok(state.events.iter().filter(|e| e.job_id == id).cloned().collect())
    }

    async fn append_event(
        &self,
        id: JobId,
        level: EventLevel,
        text: &str,
    ) -> Result<(), JobStoreError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        let job = state.jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        match level {
            EventLevel::Error => job.record_failure(),
            EventLevel::Fatal => {
                job.fail(text, Utc::now());
            }
            EventLevel::Info | EventLevel::Warning => {}
        }
        state.push_event(id, level, text);
        Ok(())
    }

    async fn finish(&self, id: JobId) -> Result<bool, JobStoreError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        let job = state.jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        if !job.finish(Utc::now()) {
            return Ok(false);
        }
        state.push_event(id, EventLevel::Info, JOB_FINISHED);
        Ok(true)
    }
}
