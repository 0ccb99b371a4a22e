use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use digiserv_core::{DomainError, IntendedUseId, MetadataId, OrderId, ProjectId, UnitId};

use crate::metadata::Metadata;
use crate::order::Order;

/// Intended use reserved for images produced for the digital library itself.
/// Units with this use get no patron deliverables.
pub const DIGITAL_COLLECTION_BUILDING: IntendedUseId = IntendedUseId::new(110);

/// Unit workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Unapproved,
    Approved,
    Canceled,
    Finalizing,
    Error,
    Done,
}

impl UnitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::Unapproved => "unapproved",
            UnitStatus::Approved => "approved",
            UnitStatus::Canceled => "canceled",
            UnitStatus::Finalizing => "finalizing",
            UnitStatus::Error => "error",
            UnitStatus::Done => "done",
        }
    }

    /// Statuses finalization may start (or resume) from.
    pub fn can_begin_finalization(&self) -> bool {
        matches!(self, UnitStatus::Approved | UnitStatus::Error)
    }
}

impl core::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for UnitStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unapproved" => Ok(UnitStatus::Unapproved),
            "approved" => Ok(UnitStatus::Approved),
            "canceled" => Ok(UnitStatus::Canceled),
            "finalizing" => Ok(UnitStatus::Finalizing),
            "error" => Ok(UnitStatus::Error),
            "done" => Ok(UnitStatus::Done),
            other => Err(DomainError::validation(format!("unknown unit status: {other}"))),
        }
    }
}

/// Why a finalization request was refused before any job was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FinalizeRejection {
    #[error("unit {0} is a re-order and cannot be finalized")]
    Reorder(UnitId),
    #[error("unit {0} is already finalizing")]
    AlreadyFinalizing(UnitId),
    #[error("unit {unit} has status {status}; only approved or error units can be finalized")]
    InvalidStatus { unit: UnitId, status: UnitStatus },
}

/// Deliverable packaging for patron orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverableFormat {
    Pdf,
    Zip,
}

impl DeliverableFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliverableFormat::Pdf => "pdf",
            DeliverableFormat::Zip => "zip",
        }
    }
}

impl core::str::FromStr for DeliverableFormat {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pdf" => Ok(DeliverableFormat::Pdf),
            "zip" => Ok(DeliverableFormat::Zip),
            other => Err(DomainError::validation(format!("unknown deliverable format: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntendedUse {
    pub id: IntendedUseId,
    pub description: String,
    pub deliverable_format: DeliverableFormat,
}

impl IntendedUse {
    pub fn is_digital_collection_building(&self) -> bool {
        self.id == DIGITAL_COLLECTION_BUILDING
    }
}

/// A batch of scanned pages under digitization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub status: UnitStatus,
    pub order_id: OrderId,
    pub metadata_id: Option<MetadataId>,
    pub intended_use_id: Option<IntendedUseId>,
    pub project_id: Option<ProjectId>,
    pub reorder: bool,
    pub throw_away: bool,
    pub include_in_dl: bool,
    pub complete_scan: bool,
    pub ocr_master_files: bool,
    pub date_archived: Option<DateTime<Utc>>,
    pub date_patron_deliverables_ready: Option<DateTime<Utc>>,
    pub date_dl_deliverables_ready: Option<DateTime<Utc>>,
}

impl Unit {
    /// A new approved unit with every flag off.
    pub fn approved(id: UnitId, order_id: OrderId) -> Self {
        Self {
            id,
            status: UnitStatus::Approved,
            order_id,
            metadata_id: None,
            intended_use_id: None,
            project_id: None,
            reorder: false,
            throw_away: false,
            include_in_dl: false,
            complete_scan: false,
            ocr_master_files: false,
            date_archived: None,
            date_patron_deliverables_ready: None,
            date_dl_deliverables_ready: None,
        }
    }

    /// Check the finalization preconditions that can be decided from the unit alone.
    pub fn ensure_can_finalize(&self) -> Result<(), FinalizeRejection> {
        if self.reorder {
            return Err(FinalizeRejection::Reorder(self.id));
        }
        match self.status {
            UnitStatus::Finalizing => Err(FinalizeRejection::AlreadyFinalizing(self.id)),
            s if s.can_begin_finalization() => Ok(()),
            status => Err(FinalizeRejection::InvalidStatus {
                unit: self.id,
                status,
            }),
        }
    }

    /// Whether this unit produces patron deliverables (anything but digital collection building).
    pub fn needs_patron_deliverables(&self) -> bool {
        self.intended_use_id
            .is_some_and(|id| id != DIGITAL_COLLECTION_BUILDING)
    }

    /// Directory name used for this unit in staging, archive and work areas.
    pub fn directory_name(&self) -> String {
        format!("{:09}", self.id.get())
    }
}

/// Completion checkpoints stamped on a unit during finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitCheckpoint {
    Archived,
    PatronDeliverablesReady,
    DlDeliverablesReady,
}

impl UnitCheckpoint {
    pub fn column(&self) -> &'static str {
        match self {
            UnitCheckpoint::Archived => "date_archived",
            UnitCheckpoint::PatronDeliverablesReady => "date_patron_deliverables_ready",
            UnitCheckpoint::DlDeliverablesReady => "date_dl_deliverables_ready",
        }
    }
}

/// A unit loaded together with the records finalization reasons about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitContext {
    pub unit: Unit,
    pub order: Order,
    pub metadata: Option<Metadata>,
    pub intended_use: Option<IntendedUse>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(status: UnitStatus) -> Unit {
        Unit {
            status,
            ..Unit::approved(UnitId::new(42), OrderId::new(7))
        }
    }

    #[test]
    fn approved_and_error_units_can_finalize() {
        assert!(unit(UnitStatus::Approved).ensure_can_finalize().is_ok());
        assert!(unit(UnitStatus::Error).ensure_can_finalize().is_ok());
    }

    #[test]
    fn finalizing_unit_is_rejected() {
        assert_eq!(
            unit(UnitStatus::Finalizing).ensure_can_finalize(),
            Err(FinalizeRejection::AlreadyFinalizing(UnitId::new(42)))
        );
    }

    #[test]
    fn reorder_is_rejected_whatever_the_status() {
        let mut u = unit(UnitStatus::Approved);
        u.reorder = true;
        assert_eq!(u.ensure_can_finalize(), Err(FinalizeRejection::Reorder(UnitId::new(42))));
    }

    #[test]
    fn other_statuses_are_rejected() {
        for status in [UnitStatus::Unapproved, UnitStatus::Canceled, UnitStatus::Done] {
            assert!(matches!(
                unit(status).ensure_can_finalize(),
                Err(FinalizeRejection::InvalidStatus { .. })
            ));
        }
    }

    #[test]
    fn digital_collection_building_needs_no_patron_deliverables() {
        let mut u = unit(UnitStatus::Approved);
        assert!(!u.needs_patron_deliverables());
        u.intended_use_id = Some(DIGITAL_COLLECTION_BUILDING);
        assert!(!u.needs_patron_deliverables());
        u.intended_use_id = Some(IntendedUseId::new(100));
        assert!(u.needs_patron_deliverables());
    }

    #[test]
    fn directory_name_is_zero_padded() {
        assert_eq!(unit(UnitStatus::Approved).directory_name(), "000000042");
    }
}
