//! Reporting finalization outcomes to the workflow project tracker.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use digiserv_core::{ProjectId, UnitId};
use digiserv_units::UnitStatus;

use super::CollaboratorError;
use super::http::{ensure_success, join};
use crate::units::UnitStore;

#[async_trait]
pub trait ProjectTracker: Send + Sync {
    /// Finalization passed every check. Implementations mark the unit done.
    async fn finalization_succeeded(
        &self,
        project: ProjectId,
        unit: UnitId,
        minutes: u64,
    ) -> Result<(), CollaboratorError>;

    async fn finalization_failed(
        &self,
        project: ProjectId,
        unit: UnitId,
        reason: &str,
        minutes: u64,
    ) -> Result<(), CollaboratorError>;
}

/// Project tracking inside this service: success marks the unit done in the unit store.
pub struct DirectProjectTracker {
    units: Arc<dyn UnitStore>,
}

impl DirectProjectTracker {
    pub fn new(units: Arc<dyn UnitStore>) -> Self {
        Self { units }
    }
}

#[async_trait]
impl ProjectTracker for DirectProjectTracker {
    async fn finalization_succeeded(
        &self,
        project: ProjectId,
        unit: UnitId,
        minutes: u64,
    ) -> Result<(), CollaboratorError> {
        self.units
            .set_unit_status(unit, UnitStatus::Done)
            .await
            .map_err(|e| CollaboratorError::invalid("project finalized", format!("unit {unit}"), e.to_string()))?;
        info!(project_id = %project, unit_id = %unit, minutes, "project finalization complete");
        Ok(())
    }

    async fn finalization_failed(
        &self,
        project: ProjectId,
        unit: UnitId,
        reason: &str,
        minutes: u64,
    ) -> Result<(), CollaboratorError> {
        warn!(project_id = %project, unit_id = %unit, minutes, reason, "project finalization failed");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct FinalizationReport<'a> {
    unit_id: UnitId,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
    minutes: u64,
}

/// Project tracking in the external workflow service.
#[derive(Debug, Clone)]
pub struct HttpProjectTracker {
    client: Client,
    base_url: String,
}

impl HttpProjectTracker {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn report(&self, project: ProjectId, report: FinalizationReport<'_>) -> Result<(), CollaboratorError> {
        let entity = format!("project {project}");
        let url = join(&self.base_url, &format!("projects/{project}/finalization"));
        let response = self
            .client
            .post(&url)
            .json(&report)
            .send()
            .await
            .map_err(|e| CollaboratorError::transport("report finalization", &entity, e))?;
        ensure_success("report finalization", entity, response).await?;
        Ok(())
    }
}

#[async_trait]
impl ProjectTracker for HttpProjectTracker {
    async fn finalization_succeeded(
        &self,
        project: ProjectId,
        unit: UnitId,
        minutes: u64,
    ) -> Result<(), CollaboratorError> {
        self.report(
            project,
            FinalizationReport {
                unit_id: unit,
                success: true,
                reason: None,
                minutes,
            },
        )
        .await
    }

    async fn finalization_failed(
        &self,
        project: ProjectId,
        unit: UnitId,
        reason: &str,
        minutes: u64,
    ) -> Result<(), CollaboratorError> {
        self.report(
            project,
            FinalizationReport {
                unit_id: unit,
                success: false,
                reason: Some(reason),
                minutes,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::InMemoryUnitStore;
    use digiserv_core::OrderId;
    use digiserv_units::{Order, OrderStatus, Unit};

    #[tokio::test]
    async fn direct_tracker_marks_unit_done() {
        let store = InMemoryUnitStore::arc();
        store.insert_order(Order::new(OrderId::new(1), OrderStatus::Approved));
        store.insert_unit(Unit {
            status: UnitStatus::Finalizing,
            ..Unit::approved(UnitId::new(4), OrderId::new(1))
        });

        let tracker = DirectProjectTracker::new(store.clone());
        tracker
            .finalization_succeeded(ProjectId::new(2), UnitId::new(4), 3)
            .await
            .unwrap();

        let ctx = store.load_unit(UnitId::new(4)).await.unwrap().unwrap();
        assert_eq!(ctx.unit.status, UnitStatus::Done);
    }

    #[tokio::test]
    async fn direct_tracker_leaves_failed_unit_for_retry() {
        let store = InMemoryUnitStore::arc();
        store.insert_order(Order::new(OrderId::new(1), OrderStatus::Approved));
        store.insert_unit(Unit {
            status: UnitStatus::Error,
            ..Unit::approved(UnitId::new(5), OrderId::new(1))
        });

        let tracker = DirectProjectTracker::new(store.clone());
        tracker
            .finalization_failed(ProjectId::new(2), UnitId::new(5), "missing pages", 3)
            .await
            .unwrap();

        let ctx = store.load_unit(UnitId::new(5)).await.unwrap().unwrap();
        assert_eq!(ctx.unit.status, UnitStatus::Error);
    }
}
