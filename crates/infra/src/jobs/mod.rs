//! Durable job storage.
//!
//! The `JobStore` trait and its in-memory implementation live in
//! `digiserv-jobs`; this module adds the Postgres implementation.

pub mod postgres;

pub use postgres::PostgresJobStore;

use digiserv_core::JobId;
use tokio::task::JoinHandle;

/// A job whose Job Status exists and whose work is running in the background.
#[derive(Debug)]
pub struct SpawnedJob {
    pub job_id: JobId,
    /// Handle of the detached task. Dropping it does not cancel the job.
    pub task: JoinHandle<()>,
}
