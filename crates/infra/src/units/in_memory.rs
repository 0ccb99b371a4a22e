use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use digiserv_core::{IntendedUseId, MasterFileId, MetadataId, OrderId, UnitId};
use digiserv_units::{
    AvailabilityPolicy, IntendedUse, MasterFile, Metadata, NewMasterFile, Order, OrderCheckpoint,
    OrderStatus, Unit, UnitCheckpoint, UnitContext, UnitStatus,
};

use super::{UnitStore, UnitStoreError};

#[derive(Debug, Default)]
struct State {
    units: BTreeMap<UnitId, Unit>,
    orders: BTreeMap<OrderId, Order>,
    metadata: BTreeMap<MetadataId, Metadata>,
    intended_uses: BTreeMap<IntendedUseId, IntendedUse>,
    master_files: BTreeMap<MasterFileId, MasterFile>,
    last_master_file_id: i64,
}

impl State {
    fn unit_mut(&mut self, id: UnitId) -> Result<&mut Unit, UnitStoreError> {
        self.units.get_mut(&id).ok_or(UnitStoreError::unit(id))
    }

    fn order_mut(&mut self, id: OrderId) -> Result<&mut Order, UnitStoreError> {
        self.orders.get_mut(&id).ok_or(UnitStoreError::order(id))
    }

    fn metadata_mut(&mut self, id: MetadataId) -> Result<&mut Metadata, UnitStoreError> {
        self.metadata.get_mut(&id).ok_or(UnitStoreError::metadata(id))
    }
}

/// In-memory unit store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryUnitStore {
    state: RwLock<State>,
}

impl InMemoryUnitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, UnitStoreError> {
        self.state
            .read()
            .map_err(|_| UnitStoreError::Storage("unit store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, UnitStoreError> {
        self.state
            .write()
            .map_err(|_| UnitStoreError::Storage("unit store lock poisoned".to_string()))
    }

    pub fn insert_order(&self, order: Order) {
        if let Ok(mut state) = self.state.write() {
            state.orders.insert(order.id, order);
        }
    }

    pub fn insert_unit(&self, unit: Unit) {
        if let Ok(mut state) = self.state.write() {
            state.units.insert(unit.id, unit);
        }
    }

    pub fn insert_metadata(&self, metadata: Metadata) {
        if let Ok(mut state) = self.state.write() {
            state.metadata.insert(metadata.id, metadata);
        }
    }

    pub fn insert_intended_use(&self, intended_use: IntendedUse) {
        if let Ok(mut state) = self.state.write() {
            state.intended_uses.insert(intended_use.id, intended_use);
        }
    }
}

#[async_trait]
impl UnitStore for InMemoryUnitStore {
    async fn load_unit(&self, id: UnitId) -> Result<Option<UnitContext>, UnitStoreError> {
        let state = self.read()?;
        let Some(unit) = state.units.get(&id).cloned() else {
            return Ok(None);
        };
        let order = state
            .orders
            .get(&unit.order_id)
            .cloned()
            .ok_or(UnitStoreError::order(unit.order_id))?;
        let metadata = unit.metadata_id.and_then(|m| state.metadata.get(&m).cloned());
        let intended_use = unit
            .intended_use_id
            .and_then(|i| state.intended_uses.get(&i).cloned());
        Ok(Some(UnitContext {
            unit,
            order,
            metadata,
            intended_use,
        }))
    }

    async fn begin_finalization(&self, id: UnitId) -> Result<Option<UnitStatus>, UnitStoreError> {
        let mut state = self.write()?;
        let unit = state.unit_mut(id)?;
        if !unit.status.can_begin_finalization() {
            return Ok(None);
        }
        let previous = unit.status;
        unit.status = UnitStatus::Finalizing;
        Ok(Some(previous))
    }

    async fn set_unit_status(&self, id: UnitId, status: UnitStatus) -> Result<(), UnitStoreError> {
        self.write()?.unit_mut(id)?.status = status;
        Ok(())
    }

    async fn set_include_in_dl(&self, id: UnitId, include: bool) -> Result<(), UnitStoreError> {
        self.write()?.unit_mut(id)?.include_in_dl = include;
        Ok(())
    }

    async fn stamp_unit(&self, id: UnitId, checkpoint: UnitCheckpoint) -> Result<(), UnitStoreError> {
        let mut state = self.write()?;
        let unit = state.unit_mut(id)?;
        let slot = match checkpoint {
            UnitCheckpoint::Archived => &mut unit.date_archived,
            UnitCheckpoint::PatronDeliverablesReady => &mut unit.date_patron_deliverables_ready,
            UnitCheckpoint::DlDeliverablesReady => &mut unit.date_dl_deliverables_ready,
        };
        slot.get_or_insert_with(Utc::now);
        Ok(())
    }

    async fn metadata(&self, id: MetadataId) -> Result<Option<Metadata>, UnitStoreError> {
        Ok(self.read()?.metadata.get(&id).cloned())
    }

    async fn set_availability_policy(
        &self,
        id: MetadataId,
        policy: AvailabilityPolicy,
    ) -> Result<(), UnitStoreError> {
        self.write()?.metadata_mut(id)?.availability_policy = Some(policy);
        Ok(())
    }

    async fn stamp_metadata_dl_ingest(&self, id: MetadataId) -> Result<(), UnitStoreError> {
        self.write()?
            .metadata_mut(id)?
            .date_dl_ingest
            .get_or_insert_with(Utc::now);
        Ok(())
    }

    async fn approve_order(&self, id: OrderId) -> Result<(), UnitStoreError> {
        let mut state = self.write()?;
        let order = state.order_mut(id)?;
        order.status = OrderStatus::Approved;
        order.date_order_approved.get_or_insert_with(Utc::now);
        Ok(())
    }

    async fn stamp_order(
        &self,
        id: OrderId,
        checkpoint: OrderCheckpoint,
    ) -> Result<bool, UnitStoreError> {
        let mut state = self.write()?;
        let order = state.order_mut(id)?;
        let slot = match checkpoint {
            OrderCheckpoint::FinalizationBegun => &mut order.date_finalization_begun,
            OrderCheckpoint::ArchivingComplete => &mut order.date_archiving_complete,
            OrderCheckpoint::PatronDeliverablesComplete => {
                &mut order.date_patron_deliverables_complete
            }
        };
        if slot.is_some() {
            return Ok(false);
        }
        *slot = Some(Utc::now());
        Ok(true)
    }

    async fn order_units(&self, id: OrderId) -> Result<Vec<Unit>, UnitStoreError> {
        Ok(self
            .read()?
            .units
            .values()
            .filter(|u| u.order_id == id)
            .cloned()
            .collect())
    }

    async fn master_files(&self, unit: UnitId) -> Result<Vec<MasterFile>, UnitStoreError> {
        let mut files: Vec<MasterFile> = self
            .read()?
            .master_files
            .values()
            .filter(|m| m.unit_id == unit)
            .cloned()
            .collect();
        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(files)
    }

    async fn create_master_file(&self, file: NewMasterFile) -> Result<MasterFile, UnitStoreError> {
        let mut state = self.write()?;
        if !state.units.contains_key(&file.unit_id) {
            return Err(UnitStoreError::unit(file.unit_id));
        }
        state.last_master_file_id += 1;
        let id = MasterFileId::new(state.last_master_file_id);
        let created = MasterFile {
            id,
            unit_id: file.unit_id,
            pid: format!("tsm:{id}"),
            filename: file.filename,
            title: Some(file.title),
            filesize: file.filesize,
            checksum: file.checksum,
            tech_meta: Some(file.tech_meta),
            date_archived: None,
        };
        state.master_files.insert(id, created.clone());
        Ok(created)
    }

    async fn update_master_file(&self, file: &MasterFile) -> Result<(), UnitStoreError> {
        let mut state = self.write()?;
        let slot = state
            .master_files
            .get_mut(&file.id)
            .ok_or(UnitStoreError::master_file(file.id))?;
        *slot = file.clone();
        Ok(())
    }

    async fn mark_master_file_archived(&self, id: MasterFileId) -> Result<(), UnitStoreError> {
        self.write()?
            .master_files
            .get_mut(&id)
            .ok_or(UnitStoreError::master_file(id))?
            .date_archived
            .get_or_insert_with(Utc::now);
        Ok(())
    }
}
