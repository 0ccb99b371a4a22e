//! Detached, panic-isolated execution of job work.
//!
//! Whatever happens inside `JobWork::run` the job ends in a terminal state:
//! `Ok` → Done, `Err` → LogFatal with the error text, panic → LogFatal with
//! the panic message (the backtrace goes to the `tracing` log). A panic
//! never propagates past the task boundary.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::sync::Once;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::tracker::JobTracker;

/// Work executed on behalf of a job.
#[async_trait]
pub trait JobWork: Send + 'static {
    type Error: core::fmt::Display + Send;

    /// Do the work. Progress and recoverable problems go through `tracker`.
    async fn run(&mut self, tracker: &JobTracker) -> Result<(), Self::Error>;

    /// Called once after `run` failed or panicked, before the job is marked failed.
    async fn on_failure(&mut self, _tracker: &JobTracker, _reason: &str) {}
}

/// Spawns job work onto the tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobRunner;

impl JobRunner {
    /// Run `work` on its own task, detached from the caller.
    pub fn spawn<W: JobWork>(tracker: JobTracker, work: W) -> JoinHandle<()> {
        tokio::spawn(Self::run(tracker, work))
    }

    /// Run `work` to a terminal job state on the current task.
    pub async fn run<W: JobWork>(tracker: JobTracker, mut work: W) {
        install_panic_hook();

        let outcome = AssertUnwindSafe(work.run(&tracker)).catch_unwind().await;
        let reason = match outcome {
            Ok(Ok(())) => {
                tracker.done().await;
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                let backtrace = take_backtrace().unwrap_or_else(|| "<unavailable>".to_string());
                error!(
                    job_id = ?tracker.job_id(),
                    panic = %message,
                    %backtrace,
                    "job panicked"
                );
                format!("unexpected panic: {message}")
            }
        };

        let cleanup = AssertUnwindSafe(work.on_failure(&tracker, &reason))
            .catch_unwind()
            .await;
        if let Err(payload) = cleanup {
            warn!(
                job_id = ?tracker.job_id(),
                panic = %panic_message(payload.as_ref()),
                "failure handler panicked"
            );
        }

        tracker.fatal(&reason).await;
    }
}

thread_local! {
    static LAST_PANIC_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chain a hook that stashes the panicking thread's backtrace. `catch_unwind`
/// runs on the same thread as the panic, so the runner can pick it up.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture().to_string();
            LAST_PANIC_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(backtrace));
            previous(info);
        }));
    });
}

fn take_backtrace() -> Option<String> {
    LAST_PANIC_BACKTRACE.with(|slot| slot.borrow_mut().take())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::event::EventLevel;
    use crate::job::{JobState, Originator};
    use crate::store::{InMemoryJobStore, JobStore};
    use digiserv_core::UnitId;

    enum Behaviour {
        Succeed,
        Fail,
        Panic,
        FatalThenSucceed,
    }

    struct Scripted {
        behaviour: Behaviour,
        failures_seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl JobWork for Scripted {
        type Error = String;

        async fn run(&mut self, tracker: &JobTracker) -> Result<(), String> {
            tracker.info("working").await;
            match self.behaviour {
                Behaviour::Succeed => Ok(()),
                Behaviour::Fail => Err("disk full".to_string()),
                Behaviour::Panic => panic!("index out of range"),
                Behaviour::FatalThenSucceed => {
                    tracker.fatal("gave up early").await;
                    Ok(())
                }
            }
        }

        async fn on_failure(&mut self, _tracker: &JobTracker, _reason: &str) {
            self.failures_seen.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn run(behaviour: Behaviour) -> (Arc<InMemoryJobStore>, digiserv_core::JobId, usize) {
        let store = InMemoryJobStore::arc();
        let job = store
            .create("Scripted", Originator::Unit(UnitId::new(1)))
            .await
            .unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let work = Scripted {
            behaviour,
            failures_seen: seen.clone(),
        };

        JobRunner::spawn(JobTracker::bound(store.clone(), job.id), work)
            .await
            .unwrap();

        let calls = seen.load(Ordering::SeqCst);
        (store, job.id, calls)
    }

    #[tokio::test]
    async fn success_marks_job_finished() {
        let (store, id, failure_calls) = run(Behaviour::Succeed).await;
        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobState::Finished);
        assert_eq!(failure_calls, 0);
    }

    #[tokio::test]
    async fn error_marks_job_failed_with_its_text() {
        let (store, id, failure_calls) = run(Behaviour::Fail).await;
        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobState::Failure);
        assert_eq!(job.error.as_deref(), Some("disk full"));
        assert_eq!(failure_calls, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panic_is_isolated_and_recorded() {
        let (store, id, failure_calls) = run(Behaviour::Panic).await;
        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobState::Failure);
        assert!(job.error.unwrap().contains("index out of range"));
        assert_eq!(failure_calls, 1);

        let events = store.events(id).await.unwrap();
        assert_eq!(events.last().unwrap().level, EventLevel::Fatal);
    }

    #[tokio::test]
    async fn explicit_fatal_is_not_overwritten_by_done() {
        let (store, id, _) = run(Behaviour::FatalThenSucceed).await;
        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobState::Failure);
        assert_eq!(job.error.as_deref(), Some("gave up early"));
    }
}
