//! Postgres-backed job store.
//!
//! ## Atomicity
//!
//! Every `JobStore` operation that touches more than one row runs in a
//! transaction that first locks the job row (`SELECT ... FOR UPDATE`). An
//! `Error` event and its failure increment, or a `Fatal` event and its
//! terminal transition, commit together or not at all. Terminal transitions
//! are conditional on `ended_at IS NULL`, so the first one wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use digiserv_core::JobId;
use digiserv_jobs::store::JOB_FINISHED;
use digiserv_jobs::{Event, EventLevel, JobState, JobStatus, JobStore, JobStoreError, Originator};

#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self, op: &'static str) -> Result<Transaction<'_, Postgres>, JobStoreError> {
        self.pool.begin().await.map_err(|e| storage(op, e))
    }
}

#[derive(Debug)]
struct JobRow {
    id: i64,
    name: String,
    originator_type: String,
    originator_id: i64,
    status: String,
    failures: i32,
    error: Option<String>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for JobRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(JobRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            originator_type: row.try_get("originator_type")?,
            originator_id: row.try_get("originator_id")?,
            status: row.try_get("status")?,
            failures: row.try_get("failures")?,
            error: row.try_get("error")?,
            started_at: row.try_get("started_at")?,
            ended_at: row.try_get("ended_at")?,
        })
    }
}

impl TryFrom<JobRow> for JobStatus {
    type Error = JobStoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let originator = Originator::from_parts(&row.originator_type, row.originator_id)
            .map_err(|e| JobStoreError::Storage(format!("job {}: {e}", row.id)))?;
        let status: JobState = row
            .status
            .parse()
            .map_err(|e| JobStoreError::Storage(format!("job {}: {e}", row.id)))?;
        Ok(JobStatus {
            id: JobId::new(row.id),
            originator,
            name: row.name,
            status,
            failures: u32::try_from(row.failures).unwrap_or_default(),
            error: row.error,
            started_at: row.started_at,
            ended_at: row.ended_at,
        })
    }
}

#[derive(Debug)]
struct EventRow {
    id: i64,
    job_status_id: i64,
    level: i16,
    text: String,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for EventRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(EventRow {
            id: row.try_get("id")?,
            job_status_id: row.try_get("job_status_id")?,
            level: row.try_get("level")?,
            text: row.try_get("text")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<EventRow> for Event {
    type Error = JobStoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let level = EventLevel::from_i16(row.level)
            .map_err(|e| JobStoreError::Storage(format!("event {}: {e}", row.id)))?;
        Ok(Event {
            id: row.id,
            job_id: JobId::new(row.job_status_id),
            level,
            text: row.text,
            created_at: row.created_at,
        })
    }
}

const JOB_COLUMNS: &str =
    "id, name, originator_type, originator_id, status, failures, error, started_at, ended_at";

fn storage(op: &str, e: sqlx::Error) -> JobStoreError {
    JobStoreError::Storage(format!("{op}: {e}"))
}

/// Lock the job row for the rest of the transaction. `false` if it does not exist.
async fn lock_job(tx: &mut Transaction<'_, Postgres>, id: JobId) -> Result<bool, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM job_statuses WHERE id = $1 FOR UPDATE")
        .bind(id.get())
        .fetch_optional(&mut **tx)
        .await?;
    Ok(row.is_some())
}

async fn insert_event(
    tx: &mut Transaction<'_, Postgres>,
    id: JobId,
    level: EventLevel,
    text: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO events (job_status_id, level, text) VALUES ($1, $2, $3)")
        .bind(id.get())
        .bind(level.as_i16())
        .bind(text)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self), err)]
    async fn create(&self, name: &str, originator: Originator) -> Result<JobStatus, JobStoreError> {
        let row: JobRow = sqlx::query_as(&format!(
            "INSERT INTO job_statuses (name, originator_type, originator_id, status, failures, started_at) \
             VALUES ($1, $2, $3, 'running', 0, now()) RETURNING {JOB_COLUMNS}"
        ))
        .bind(name)
        .bind(originator.kind())
        .bind(originator.raw_id())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| storage("create", e))?;
        row.try_into()
    }

    async fn get(&self, id: JobId) -> Result<Option<JobStatus>, JobStoreError> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM job_statuses WHERE id = $1"))
                .bind(id.get())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| storage("get", e))?;
        row.map(JobStatus::try_from).transpose()
    }

    async fn list(
        &self,
        originator: Option<Originator>,
        limit: usize,
    ) -> Result<Vec<JobStatus>, JobStoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<JobRow> = match originator {
            Some(o) => {
                sqlx::query_as(&format!(
                    "SELECT {JOB_COLUMNS} FROM job_statuses \
                     WHERE originator_type = $1 AND originator_id = $2 ORDER BY id DESC LIMIT $3"
                ))
                .bind(o.kind())
                .bind(o.raw_id())
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {JOB_COLUMNS} FROM job_statuses ORDER BY id DESC LIMIT $1"
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| storage("list", e))?;
        rows.into_iter().map(JobStatus::try_from).collect()
    }

    async fn events(&self, id: JobId) -> Result<Vec<Event>, JobStoreError> {
        if self.get(id).await?.is_none() {
            return Err(JobStoreError::NotFound(id));
        }
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT id, job_status_id, level, text, created_at FROM events \
             WHERE job_status_id = $1 ORDER BY id ASC",
        )
        .bind(id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage("events", e))?;
        rows.into_iter().map(Event::try_from).collect()
    }

    #[instrument(skip(self, text), fields(job_id = %id, ?level), err)]
    async fn append_event(
        &self,
        id: JobId,
        level: EventLevel,
        text: &str,
    ) -> Result<(), JobStoreError> {
        let mut tx = self.begin("append_event").await?;
        if !lock_job(&mut tx, id).await.map_err(|e| storage("append_event", e))? {
            return Err(JobStoreError::NotFound(id));
        }

        let update = match level {
            EventLevel::Error => Some(
                sqlx::query("UPDATE job_statuses SET failures = failures + 1 WHERE id = $1")
                    .bind(id.get()),
            ),
            EventLevel::Fatal => Some(
                sqlx::query(
                    "UPDATE job_statuses SET status = 'failure', error = $2, ended_at = now() \
                     WHERE id = $1 AND ended_at IS NULL",
                )
                .bind(id.get())
                .bind(text),
            ),
            EventLevel::Info | EventLevel::Warning => None,
        };
        if let Some(update) = update {
            update
                .execute(&mut *tx)
                .await
                .map_err(|e| storage("append_event", e))?;
        }

        insert_event(&mut tx, id, level, text)
            .await
            .map_err(|e| storage("append_event", e))?;
        tx.commit().await.map_err(|e| storage("append_event", e))
    }

    #[instrument(skip(self), fields(job_id = %id), err)]
    async fn finish(&self, id: JobId) -> Result<bool, JobStoreError> {
        let mut tx = self.begin("finish").await?;
        if !lock_job(&mut tx, id).await.map_err(|e| storage("finish", e))? {
            return Err(JobStoreError::NotFound(id));
        }

        let updated = sqlx::query(
            "UPDATE job_statuses SET status = 'finished', ended_at = now() \
             WHERE id = $1 AND ended_at IS NULL",
        )
        .bind(id.get())
        .execute(&mut *tx)
        .await
        .map_err(|e| storage("finish", e))?
        .rows_affected();
        if updated == 0 {
            return Ok(false);
        }

        insert_event(&mut tx, id, EventLevel::Info, JOB_FINISHED)
            .await
            .map_err(|e| storage("finish", e))?;
        tx.commit().await.map_err(|e| storage("finish", e))?;
        Ok(true)
    }
}
