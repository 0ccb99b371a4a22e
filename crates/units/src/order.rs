use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use digiserv_core::{DomainError, OrderId};

use crate::unit::{Unit, UnitStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Requested,
    Deferred,
    Approved,
    Canceled,
    Completed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Requested => "requested",
            OrderStatus::Deferred => "deferred",
            OrderStatus::Approved => "approved",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Completed => "completed",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(OrderStatus::Requested),
            "deferred" => Ok(OrderStatus::Deferred),
            "approved" => Ok(OrderStatus::Approved),
            "canceled" => Ok(OrderStatus::Canceled),
            "completed" => Ok(OrderStatus::Completed),
            other => Err(DomainError::validation(format!("unknown order status: {other}"))),
        }
    }
}

/// A patron or internal request grouping one or more units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    pub date_order_approved: Option<DateTime<Utc>>,
    pub date_finalization_begun: Option<DateTime<Utc>>,
    pub date_archiving_complete: Option<DateTime<Utc>>,
    pub date_patron_deliverables_complete: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(id: OrderId, status: OrderStatus) -> Self {
        Self {
            id,
            status,
            date_order_approved: None,
            date_finalization_begun: None,
            date_archiving_complete: None,
            date_patron_deliverables_complete: None,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status == OrderStatus::Approved
    }
}

/// Date stamps recorded on an order as its units progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderCheckpoint {
    FinalizationBegun,
    ArchivingComplete,
    PatronDeliverablesComplete,
}

impl OrderCheckpoint {
    pub fn column(&self) -> &'static str {
        match self {
            OrderCheckpoint::FinalizationBegun => "date_finalization_begun",
            OrderCheckpoint::ArchivingComplete => "date_archiving_complete",
            OrderCheckpoint::PatronDeliverablesComplete => "date_patron_deliverables_complete",
        }
    }

    pub fn is_set(&self, order: &Order) -> bool {
        match self {
            OrderCheckpoint::FinalizationBegun => order.date_finalization_begun.is_some(),
            OrderCheckpoint::ArchivingComplete => order.date_archiving_complete.is_some(),
            OrderCheckpoint::PatronDeliverablesComplete => {
                order.date_patron_deliverables_complete.is_some()
            }
        }
    }
}

/// Units of an order that still need archiving: not canceled and not archived.
pub fn archiving_outstanding(units: &[Unit]) -> usize {
    units
        .iter()
        .filter(|u| u.status != UnitStatus::Canceled && u.date_archived.is_none())
        .count()
}

/// Units of an order still waiting for patron deliverables.
///
/// Canceled units and units that produce no patron deliverables do not count.
pub fn deliverables_outstanding(units: &[Unit]) -> usize {
    units
        .iter()
        .filter(|u| u.status != UnitStatus::Canceled && u.needs_patron_deliverables())
        .filter(|u| u.date_patron_deliverables_ready.is_none())
        .count()
}
