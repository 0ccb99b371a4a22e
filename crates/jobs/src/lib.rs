//! Job Status tracking and background execution.
//!
//! ## Components
//!
//! - `JobStatus`: one asynchronous unit of work (originator, lifecycle, failures)
//! - `Event`: append-only, leveled log line owned by a job
//! - `JobStore`: persistence for jobs and their events (in-memory here, Postgres in infra)
//! - `JobTracker`: the LogInfo / LogError / LogFatal / Done operations
//! - `JobRunner`: detached, panic-isolated execution of a `JobWork`

pub mod event;
pub mod job;
pub mod runner;
pub mod store;
pub mod tracker;

pub use event::{Event, EventLevel};
pub use job::{JobState, JobStatus, Originator};
pub use runner::{JobRunner, JobWork};
pub use store::{InMemoryJobStore, JobStore, JobStoreError};
pub use tracker::JobTracker;
