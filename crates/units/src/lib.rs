//! Digitization unit domain (finalization rules).
//!
//! This crate contains the business rules a unit must satisfy on its way
//! from `approved` to `done`, implemented purely as deterministic domain
//! logic (no IO, no HTTP, no storage).

pub mod completion;
pub mod master_file;
pub mod metadata;
pub mod order;
pub mod publish;
pub mod qa;
pub mod staging;
pub mod unit;

pub use completion::{CompletionProblem, completion_problems};
pub use master_file::{ExtractionError, ImageTechMeta, MasterFile, NewMasterFile};
pub use metadata::{AvailabilityPolicy, Metadata, MetadataKind, OcrHint};
pub use order::{Order, OrderCheckpoint, OrderStatus, archiving_outstanding, deliverables_outstanding};
pub use publish::{AutoPublish, PUBLIC_DOMAIN_CUTOFF_YEAR, SkipReason, eligibility};
pub use qa::{QaProblem, qa_unit};
pub use staging::{
    MIN_IMAGE_BYTES, StagedEntry, StagedImage, StagingProblem, StagingReport, inspect,
};
pub use unit::{
    DIGITAL_COLLECTION_BUILDING, DeliverableFormat, FinalizeRejection, IntendedUse, Unit,
    UnitCheckpoint, UnitContext, UnitStatus,
};
