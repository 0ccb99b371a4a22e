//! Append-only event log lines attached to a job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use digiserv_core::{DomainError, JobId};

/// Severity of an event. Ordered: `Info < Warning < Error < Fatal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Info,
    Warning,
    Error,
    Fatal,
}

impl EventLevel {
    /// Numeric level as stored in the `events.level` column.
    pub fn as_i16(&self) -> i16 {
        match self {
            EventLevel::Info => 0,
            EventLevel::Warning => 1,
            EventLevel::Error => 2,
            EventLevel::Fatal => 3,
        }
    }

    pub fn from_i16(level: i16) -> Result<Self, DomainError> {
        match level {
            0 => Ok(EventLevel::Info),
            1 => Ok(EventLevel::Warning),
            2 => Ok(EventLevel::Error),
            3 => Ok(EventLevel::Fatal),
            other => Err(DomainError::validation(format!("unknown event level: {other}"))),
        }
    }
}

/// One immutable log line belonging to a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub job_id: JobId,
    pub level: EventLevel,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered() {
        assert!(EventLevel::Info < EventLevel::Warning);
        assert!(EventLevel::Warning < EventLevel::Error);
        assert!(EventLevel::Error < EventLevel::Fatal);
    }

    #[test]
    fn stored_level_round_trips() {
        for level in [EventLevel::Info, EventLevel::Warning, EventLevel::Error, EventLevel::Fatal] {
            assert_eq!(EventLevel::from_i16(level.as_i16()).unwrap(), level);
        }
        assert!(EventLevel::from_i16(9).is_err());
    }
}
