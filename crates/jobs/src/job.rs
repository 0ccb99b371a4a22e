//! Job Status record and its lifecycle transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use digiserv_core::{
    DomainError, JobId, MetadataId, OrderId, ProjectId, StaffMemberId, UnitId,
};

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Running,
    Finished,
    Failure,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Running => "running",
            JobState::Finished => "finished",
            JobState::Failure => "failure",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Running)
    }
}

impl core::str::FromStr for JobState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(JobState::Running),
            "finished" => Ok(JobState::Finished),
            "failure" => Ok(JobState::Failure),
            other => Err(DomainError::validation(format!("unknown job state: {other}"))),
        }
    }
}

/// The entity whose request started a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id")]
pub enum Originator {
    Unit(UnitId),
    Metadata(MetadataId),
    Order(OrderId),
    StaffMember(StaffMemberId),
    Project(ProjectId),
}

impl Originator {
    /// Type tag as stored in the `originator_type` column.
    pub fn kind(&self) -> &'static str {
        match self {
            Originator::Unit(_) => "Unit",
            Originator::Metadata(_) => "Metadata",
            Originator::Order(_) => "Order",
            Originator::StaffMember(_) => "StaffMember",
            Originator::Project(_) => "Project",
        }
    }

    pub fn raw_id(&self) -> i64 {
        match self {
            Originator::Unit(id) => id.get(),
            Originator::Metadata(id) => id.get(),
            Originator::Order(id) => id.get(),
            Originator::StaffMember(id) => id.get(),
            Originator::Project(id) => id.get(),
        }
    }

    /// Rebuild an originator from its stored (type tag, id) pair.
    pub fn from_parts(kind: &str, id: i64) -> Result<Self, DomainError> {
        match kind {
            "Unit" => Ok(Originator::Unit(UnitId::new(id))),
            "Metadata" => Ok(Originator::Metadata(MetadataId::new(id))),
            "Order" => Ok(Originator::Order(OrderId::new(id))),
            "StaffMember" => Ok(Originator::StaffMember(StaffMemberId::new(id))),
            "Project" => Ok(Originator::Project(ProjectId::new(id))),
            other => Err(DomainError::validation(format!(
                "unknown originator type: {other}"
            ))),
        }
    }
}

impl core::fmt::Display for Originator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.kind(), self.raw_id())
    }
}

/// One asynchronous operation and its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: JobId,
    pub originator: Originator,
    pub name: String,
    pub status: JobState,
    pub failures: u32,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl JobStatus {
    /// A freshly started job.
    pub fn started(
        id: JobId,
        name: impl Into<String>,
        originator: Originator,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            originator,
            name: name.into(),
            status: JobState::Running,
            failures: 0,
            error: None,
            started_at: at,
            ended_at: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Count one non-fatal error.
    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    /// Terminal success. Returns `false` (and changes nothing) if the job already ended.
    pub fn finish(&mut self, at: DateTime<Utc>) -> bool {
        if !self.is_running() {
            return false;
        }
        self.ended_at = Some(at);
        self.status = JobState::Finished;
        true
    }

    /// Terminal failure. Returns `false` (and changes nothing) if the job already ended.
    pub fn fail(&mut self, error: impl Into<String>, at: DateTime<Utc>) -> bool {
        if !self.is_running() {
            return false;
        }
        self.ended_at = Some(at);
        self.status = JobState::Failure;
        self.error = Some(error.into());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn job() -> JobStatus {
        JobStatus::started(JobId::new(1), "Test", Originator::Unit(UnitId::new(5)), Utc::now())
    }

    #[test]
    fn new_job_is_running() {
        let j = job();
        assert_eq!(j.status, JobState::Running);
        assert!(j.ended_at.is_none());
        assert_eq!(j.failures, 0);
        assert!(j.error.is_none());
    }

    #[test]
    fn fail_then_fail_keeps_first_error() {
        let mut j = job();
        assert!(j.fail("first", Utc::now()));
        let ended = j.ended_at;

        assert!(!j.fail("second", Utc::now()));
        assert_eq!(j.status, JobState::Failure);
        assert_eq!(j.error.as_deref(), Some("first"));
        assert_eq!(j.ended_at, ended);
    }

    #[test]
    fn finish_then_fail_is_noop() {
        let mut j = job();
        assert!(j.finish(Utc::now()));
        assert!(!j.fail("late", Utc::now()));
        assert_eq!(j.status, JobState::Finished);
        assert!(j.error.is_none());
    }

    #[test]
    fn originator_round_trips_through_parts() {
        let o = Originator::Metadata(MetadataId::new(17));
        assert_eq!(Originator::from_parts(o.kind(), o.raw_id()).unwrap(), o);
        assert!(Originator::from_parts("Invoice", 1).is_err());
    }

    #[test]
    fn originator_serializes_as_tagged_object() {
        let json = serde_json::to_value(Originator::Unit(UnitId::new(42))).unwrap();
        assert_eq!(json, serde_json::json!({"type": "Unit", "id": 42}));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Info,
        Error,
        Fatal(String),
        Done,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Info),
            Just(Op::Error),
            "[a-z]{1,8}".prop_map(Op::Fatal),
            Just(Op::Done),
        ]
    }

    proptest! {
        #[test]
        fn failures_count_errors_and_terminal_state_is_sticky(ops in proptest::collection::vec(op(), 0..40)) {
            let mut j = job();
            let mut errors = 0u32;
            let mut first_terminal: Option<(JobState, Option<String>)> = None;

            for op in ops {
                match op {
                    Op::Info => {}
                    Op::Error => {
                        errors += 1;
                        j.record_failure();
                    }
                    Op::Fatal(text) => {
                        j.fail(text, Utc::now());
                    }
                    Op::Done => {
                        j.finish(Utc::now());
                    }
                }

                if first_terminal.is_none() && !j.is_running() {
                    first_terminal = Some((j.status, j.error.clone()));
                }
                if let Some((status, error)) = &first_terminal {
                    prop_assert_eq!(j.status, *status);
                    prop_assert_eq!(&j.error, error);
                    prop_assert!(j.ended_at.is_some());
                } else {
                    prop_assert_eq!(j.status, JobState::Running);
                }
            }

            prop_assert_eq!(j.failures, errors);
        }
    }
}
