//! Order-level checkpoints derived from the state of all of an order's units.
//!
//! There is no lock across the read and the stamp: two units of one order
//! finishing together can both see the other as outstanding, leaving the
//! order unstamped until the next check.

use tracing::debug;

use digiserv_core::OrderId;
use digiserv_jobs::JobTracker;
use digiserv_units::{OrderCheckpoint, archiving_outstanding, deliverables_outstanding};

use crate::units::{UnitStore, UnitStoreError};

/// Stamp the order's archiving-complete date once every live unit is archived.
pub async fn check_archive_complete(
    units: &dyn UnitStore,
    tracker: &JobTracker,
    order: OrderId,
) -> Result<(), UnitStoreError> {
    let outstanding = archiving_outstanding(&units.order_units(order).await?);
    if outstanding > 0 {
        debug!(order_id = %order, outstanding, "order still has unarchived units");
        return Ok(());
    }
    if units.stamp_order(order, OrderCheckpoint::ArchivingComplete).await? {
        tracker
            .info(format!("All units in order {order} are archived"))
            .await;
    }
    Ok(())
}

/// Stamp the order's patron-deliverables-complete date once every unit that
/// needs deliverables has them.
pub async fn check_deliverables_complete(
    units: &dyn UnitStore,
    tracker: &JobTracker,
    order: OrderId,
) -> Result<(), UnitStoreError> {
    let outstanding = deliverables_outstanding(&units.order_units(order).await?);
    if outstanding > 0 {
        debug!(order_id = %order, outstanding, "order still awaits patron deliverables");
        return Ok(());
    }
    if units
        .stamp_order(order, OrderCheckpoint::PatronDeliverablesComplete)
        .await?
    {
        tracker
            .info(format!("All patron deliverables for order {order} are ready"))
            .await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::units::InMemoryUnitStore;
    use digiserv_core::{IntendedUseId, UnitId};
    use digiserv_units::{Order, OrderStatus, Unit, UnitStatus};

    const ORDER: OrderId = OrderId::new(7);

    fn store(units: Vec<Unit>) -> InMemoryUnitStore {
        let store = InMemoryUnitStore::new();
        store.insert_order(Order::new(ORDER, OrderStatus::Approved));
        for unit in units {
            store.insert_unit(unit);
        }
        store
    }

    fn unit(id: i64) -> Unit {
        Unit::approved(UnitId::new(id), ORDER)
    }

    async fn order(store: &InMemoryUnitStore) -> Order {
        store.load_unit(UnitId::new(1)).await.unwrap().unwrap().order
    }

    #[tokio::test]
    async fn archive_complete_waits_for_every_live_unit() {
        let mut archived = unit(1);
        archived.date_archived = Some(Utc::now());
        let canceled = Unit {
            status: UnitStatus::Canceled,
            ..unit(3)
        };
        let store = store(vec![archived, unit(2), canceled]);
        let tracker = JobTracker::detached();

        check_archive_complete(&store, &tracker, ORDER).await.unwrap();
        assert!(order(&store).await.date_archiving_complete.is_none());

        store
            .stamp_unit(UnitId::new(2), digiserv_units::UnitCheckpoint::Archived)
            .await
            .unwrap();
        check_archive_complete(&store, &tracker, ORDER).await.unwrap();
        let stamped = order(&store).await.date_archiving_complete;
        assert!(stamped.is_some());

        check_archive_complete(&store, &tracker, ORDER).await.unwrap();
        assert_eq!(order(&store).await.date_archiving_complete, stamped);
    }

    #[tokio::test]
    async fn deliverables_ignore_collection_building_units() {
        let mut patron = unit(1);
        patron.intended_use_id = Some(IntendedUseId::new(101));
        patron.date_patron_deliverables_ready = Some(Utc::now());
        let mut dcb = unit(2);
        dcb.intended_use_id = Some(digiserv_units::DIGITAL_COLLECTION_BUILDING);
        let store = store(vec![patron, dcb]);

        check_deliverables_complete(&store, &JobTracker::detached(), ORDER)
            .await
            .unwrap();
        assert!(order(&store).await.date_patron_deliverables_complete.is_some());
    }
}
