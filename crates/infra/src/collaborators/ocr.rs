//! OCR requests and correlation of their asynchronous completion callbacks.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::warn;

use digiserv_core::{JobId, UnitId};

use super::CollaboratorError;
use super::http::{ensure_success, join};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OcrRequest {
    pub pid: String,
    pub language: String,
    pub unit_id: UnitId,
    pub callback_url: String,
}

#[async_trait]
pub trait OcrService: Send + Sync {
    /// Ask for OCR. Completion arrives later through the callback URL.
    async fn request_ocr(&self, request: &OcrRequest) -> Result<(), CollaboratorError>;
}

#[derive(Debug, Clone)]
pub struct HttpOcrService {
    client: Client,
    base_url: String,
}

impl HttpOcrService {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl OcrService for HttpOcrService {
    async fn request_ocr(&self, request: &OcrRequest) -> Result<(), CollaboratorError> {
        let url = join(&self.base_url, &request.pid);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| CollaboratorError::transport("request ocr", &request.pid, e))?;
        ensure_success("request ocr", &request.pid, response).await?;
        Ok(())
    }
}

/// Outcome reported by the OCR service's callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcrOutcome {
    Success,
    Failure(String),
}

/// Jobs currently waiting for an OCR callback, keyed by job.
#[derive(Debug, Default)]
pub struct OcrWaitRegistry {
    pending: Mutex<HashMap<JobId, oneshot::Sender<OcrOutcome>>>,
}

impl OcrWaitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start waiting for `job`. A previous wait for the same job is dropped.
    pub fn register(&self, job: JobId) -> oneshot::Receiver<OcrOutcome> {
        let (tx, rx) = oneshot::channel();
        match self.pending.lock() {
            Ok(mut pending) => {
                pending.insert(job, tx);
            }
            Err(_) => warn!(job_id = %job, "OCR wait registry lock poisoned"),
        }
        rx
    }

    /// Deliver a callback outcome. Removes the wait whatever the outcome;
    /// returns `false` if nobody was waiting.
    pub fn complete(&self, job: JobId, outcome: OcrOutcome) -> bool {
        self.claim(job).is_some_and(|wait| wait.deliver(outcome))
    }

    /// Remove the wait for `job` and hand it to the caller. Dropping the
    /// claim without delivering ends the job's wait with no outcome.
    pub fn claim(&self, job: JobId) -> Option<ClaimedOcrWait> {
        self.take(job).map(|sender| ClaimedOcrWait { sender })
    }

    /// Stop waiting without an outcome (timeout or request failure).
    pub fn cancel(&self, job: JobId) {
        self.take(job);
    }

    pub fn is_pending(&self, job: JobId) -> bool {
        self.pending
            .lock()
            .map(|p| p.contains_key(&job))
            .unwrap_or(false)
    }

    fn take(&self, job: JobId) -> Option<oneshot::Sender<OcrOutcome>> {
        self.pending.lock().ok()?.remove(&job)
    }
}

/// A wait already removed from the registry.
#[derive(Debug)]
pub struct ClaimedOcrWait {
    sender: oneshot::Sender<OcrOutcome>,
}

impl ClaimedOcrWait {
    /// Returns `false` if the job stopped waiting in the meantime.
    pub fn deliver(self, outcome: OcrOutcome) -> bool {
        self.sender.send(outcome).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn callback_reaches_the_waiting_job() {
        let registry = OcrWaitRegistry::new();
        let rx = registry.register(JobId::new(7));
        assert!(registry.is_pending(JobId::new(7)));

        assert!(registry.complete(JobId::new(7), OcrOutcome::Failure("bad scan".into())));
        assert_eq!(rx.await.unwrap(), OcrOutcome::Failure("bad scan".into()));
        assert!(!registry.is_pending(JobId::new(7)));
    }

    #[tokio::test]
    async fn callbacks_are_correlated_by_job() {
        let registry = OcrWaitRegistry::new();
        let mut first = registry.register(JobId::new(1));
        let second = registry.register(JobId::new(2));

        registry.complete(JobId::new(2), OcrOutcome::Success);
        assert_eq!(second.await.unwrap(), OcrOutcome::Success);
        assert!(first.try_recv().is_err());
        assert!(registry.is_pending(JobId::new(1)));
    }

    #[tokio::test]
    async fn dropped_claim_releases_the_waiting_job() {
        let registry = OcrWaitRegistry::new();
        let rx = registry.register(JobId::new(4));

        let claim = registry.claim(JobId::new(4));
        assert!(claim.is_some());
        assert!(!registry.is_pending(JobId::new(4)));
        drop(claim);

        assert!(rx.await.is_err());
        assert!(registry.claim(JobId::new(4)).is_none());
    }

    #[test]
    fn unknown_or_cancelled_job_is_not_delivered() {
        let registry = OcrWaitRegistry::new();
        assert!(!registry.complete(JobId::new(3), OcrOutcome::Success));

        let _rx = registry.register(JobId::new(3));
        registry.cancel(JobId::new(3));
        assert!(!registry.complete(JobId::new(3), OcrOutcome::Success));
    }
}
