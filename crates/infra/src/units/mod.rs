//! Persistence for units, orders, metadata and master files.

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;

use digiserv_core::{MasterFileId, MetadataId, OrderId, UnitId};
use digiserv_units::{
    AvailabilityPolicy, MasterFile, Metadata, NewMasterFile, OrderCheckpoint, Unit, UnitCheckpoint,
    UnitContext, UnitStatus,
};

pub use in_memory::InMemoryUnitStore;
pub use postgres::PostgresUnitStore;

/// Unit store abstraction.
///
/// Checkpoint stamps only set a date that is still unset, so replaying a
/// step never moves a recorded date.
#[async_trait]
pub trait UnitStore: Send + Sync {
    /// Load a unit with its order, metadata and intended use.
    async fn load_unit(&self, id: UnitId) -> Result<Option<UnitContext>, UnitStoreError>;

    /// Claim a unit for finalization.
    ///
    /// Moves the unit to `finalizing` only if it is currently `approved` or
    /// `error`, in one conditional write. Returns the status it had before,
    /// or `None` if another request got there first.
    async fn begin_finalization(&self, id: UnitId) -> Result<Option<UnitStatus>, UnitStoreError>;

    async fn set_unit_status(&self, id: UnitId, status: UnitStatus) -> Result<(), UnitStoreError>;

    async fn set_include_in_dl(&self, id: UnitId, include: bool) -> Result<(), UnitStoreError>;

    async fn stamp_unit(&self, id: UnitId, checkpoint: UnitCheckpoint) -> Result<(), UnitStoreError>;

    async fn metadata(&self, id: MetadataId) -> Result<Option<Metadata>, UnitStoreError>;

    async fn set_availability_policy(
        &self,
        id: MetadataId,
        policy: AvailabilityPolicy,
    ) -> Result<(), UnitStoreError>;

    async fn stamp_metadata_dl_ingest(&self, id: MetadataId) -> Result<(), UnitStoreError>;

    /// Mark an order approved, stamping its approval date if unset.
    async fn approve_order(&self, id: OrderId) -> Result<(), UnitStoreError>;

    /// Stamp an order checkpoint. Returns `true` if the date was newly set.
    async fn stamp_order(&self, id: OrderId, checkpoint: OrderCheckpoint)
        -> Result<bool, UnitStoreError>;

    async fn order_units(&self, id: OrderId) -> Result<Vec<Unit>, UnitStoreError>;

    /// Master files of a unit ordered by filename.
    async fn master_files(&self, unit: UnitId) -> Result<Vec<MasterFile>, UnitStoreError>;

    /// Create a master file. The store assigns its id and pid.
    async fn create_master_file(&self, file: NewMasterFile) -> Result<MasterFile, UnitStoreError>;

    async fn update_master_file(&self, file: &MasterFile) -> Result<(), UnitStoreError>;

    async fn mark_master_file_archived(&self, id: MasterFileId) -> Result<(), UnitStoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UnitStoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl UnitStoreError {
    pub fn unit(id: UnitId) -> Self {
        Self::NotFound(format!("unit {id}"))
    }

    pub fn order(id: OrderId) -> Self {
        Self::NotFound(format!("order {id}"))
    }

    pub fn metadata(id: MetadataId) -> Self {
        Self::NotFound(format!("metadata {id}"))
    }

    pub fn master_file(id: MasterFileId) -> Self {
        Self::NotFound(format!("master file {id}"))
    }
}
