//! The LogInfo / LogError / LogFatal / Done operations.
//!
//! A `JobTracker` is handed to background work. It may be bound to a job
//! (events go to the store) or detached (pre-flight contexts with no job:
//! messages only reach the `tracing` subscriber). Store failures while
//! logging are reported through `tracing` and never surface to the caller.

use std::sync::Arc;

use tracing::{error, info, warn};

use digiserv_core::JobId;

use crate::event::EventLevel;
use crate::store::JobStore;

#[derive(Clone)]
pub struct JobTracker {
    bound: Option<(Arc<dyn JobStore>, JobId)>,
}

impl core::fmt::Debug for JobTracker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JobTracker")
            .field("job_id", &self.job_id())
            .finish()
    }
}

impl JobTracker {
    pub fn bound(store: Arc<dyn JobStore>, job_id: JobId) -> Self {
        Self {
            bound: Some((store, job_id)),
        }
    }

    /// A tracker with no job behind it.
    pub fn detached() -> Self {
        Self { bound: None }
    }

    pub fn job_id(&self) -> Option<JobId> {
        self.bound.as_ref().map(|(_, id)| *id)
    }

    /// Append an `Info` event.
    pub async fn info(&self, text: impl AsRef<str>) {
        let text = text.as_ref();
        match self.job_id() {
            Some(job_id) => info!(%job_id, "{text}"),
            None => info!("{text}"),
        }
        self.append(EventLevel::Info, text).await;
    }

    /// Append an `Error` event and count one failure. The job keeps running.
    pub async fn error(&self, text: impl AsRef<str>) {
        let text = text.as_ref();
        match self.job_id() {
            Some(job_id) => warn!(%job_id, "ERROR: {text}"),
            None => warn!("ERROR: {text}"),
        }
        self.append(EventLevel::Error, text).await;
    }

    /// Append a `Fatal` event and end the job as `failure`, unless it already ended.
    pub async fn fatal(&self, text: impl AsRef<str>) {
        let text = text.as_ref();
        match self.job_id() {
            Some(job_id) => error!(%job_id, "FATAL: {text}"),
            None => error!("FATAL: {text}"),
        }
        self.append(EventLevel::Fatal, text).await;
    }

    /// End the job as `finished`, unless it already ended.
    pub async fn done(&self) {
        let Some((store, job_id)) = &self.bound else {
            return;
        };
        match store.finish(*job_id).await {
            Ok(true) => info!(%job_id, "job finished"),
            Ok(false) => {}
            Err(e) => warn!(%job_id, error = %e, "failed to mark job finished"),
        }
    }

    async fn append(&self, level: EventLevel, text: &str) {
        let Some((store, job_id)) = &self.bound else {
            return;
        };
        if let Err(e) = store.append_event(*job_id, level, text).await {
            warn!(%job_id, ?level, error = %e, "failed to record job event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobState, Originator};
    use crate::store::{InMemoryJobStore, JOB_FINISHED};
    use digiserv_core::UnitId;

    async fn setup() -> (Arc<InMemoryJobStore>, JobTracker) {
        let store = InMemoryJobStore::arc();
        let job = store
            .create("Test", Originator::Unit(UnitId::new(5)))
            .await
            .unwrap();
        let tracker = JobTracker::bound(store.clone(), job.id);
        (store, tracker)
    }

    #[tokio::test]
    async fn normal_completion() {
        let (store, tracker) = setup().await;
        let id = tracker.job_id().unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobState::Running);
        assert!(job.ended_at.is_none());

        tracker.done().await;

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobState::Finished);
        assert!(job.ended_at.is_some());
        let events = store.events(id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, EventLevel::Info);
        assert_eq!(events[0].text, JOB_FINISHED);
    }

    #[tokio::test]
    async fn fatal_then_duplicate_fatal() {
        let (store, tracker) = setup().await;
        let id = tracker.job_id().unwrap();

        tracker.fatal("first").await;
        let after_first = store.get(id).await.unwrap().unwrap();
        assert_eq!(after_first.status, JobState::Failure);
        assert_eq!(after_first.error.as_deref(), Some("first"));

        tracker.fatal("second").await;
        let after_second = store.get(id).await.unwrap().unwrap();
        assert_eq!(after_second.status, JobState::Failure);
        assert_eq!(after_second.error.as_deref(), Some("first"));
        assert_eq!(after_second.ended_at, after_first.ended_at);
    }

    #[tokio::test]
    async fn done_then_fatal_keeps_finished() {
        let (store, tracker) = setup().await;
        let id = tracker.job_id().unwrap();

        tracker.done().await;
        let finished = store.get(id).await.unwrap().unwrap();
        tracker.fatal("too late").await;
        tracker.done().await;

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobState::Finished);
        assert!(job.error.is_none());
        assert_eq!(job.ended_at, finished.ended_at);
        let finished_events = store
            .events(id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.text == JOB_FINISHED)
            .count();
        assert_eq!(finished_events, 1);
    }

    #[tokio::test]
    async fn errors_accumulate_without_ending_the_job() {
        let (store, tracker) = setup().await;
        let id = tracker.job_id().unwrap();

        tracker.error("one").await;
        tracker.info("between").await;
        tracker.error("two").await;
        tracker.fatal("stop").await;
        tracker.error("after the end").await;

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.failures, 3);
        assert_eq!(job.error.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn detached_tracker_tolerates_every_operation() {
        let tracker = JobTracker::detached();
        assert!(tracker.job_id().is_none());
        tracker.info("pre-flight").await;
        tracker.error("pre-flight problem").await;
        tracker.fatal("pre-flight stop").await;
        tracker.done().await;
    }

    #[tokio::test]
    async fn store_failures_do_not_reach_the_caller() {
        let store = InMemoryJobStore::arc();
        let tracker = JobTracker::bound(store, JobId::new(404));
        tracker.info("nobody is listening").await;
        tracker.done().await;
    }
}
