//! External systems the workflows talk to.
//!
//! Every collaborator sits behind a trait; the HTTP/filesystem impls are used in
//! production and the [`memory`] fakes in tests and local development.

pub mod archive;
pub mod catalog;
pub mod checksum;
mod command;
pub mod deliverables;
mod error;
pub mod finding_aid;
pub mod http;
pub mod iiif;
pub mod memory;
pub mod ocr;
pub mod preservation;
pub mod project;
pub mod reindex;
pub mod techmeta;

use std::sync::Arc;

pub use archive::{ArchiveStore, FsArchiveStore};
pub use catalog::{CatalogLookup, HttpCatalogLookup};
pub use deliverables::{DeliverableBuilder, DeliverableRequest, FsDeliverableBuilder};
pub use error::CollaboratorError;
pub use finding_aid::{ArchivalObject, FindingAidService, HttpFindingAidService, NewDigitalObject};
pub use iiif::{FsIiifStore, IiifStore};
pub use ocr::{ClaimedOcrWait, HttpOcrService, OcrOutcome, OcrRequest, OcrService, OcrWaitRegistry};
pub use preservation::{HttpPreservationRegistry, PackageState, PackageStatus, PreservationRegistry};
pub use project::{DirectProjectTracker, HttpProjectTracker, ProjectTracker};
pub use reindex::{HttpReindexService, ReindexService, ReindexTarget};
pub use techmeta::{IdentifyExtractor, TechMetadataExtractor};

use memory::{
    InMemoryArchiveStore, InMemoryFindingAidService, InMemoryIiifStore,
    InMemoryPreservationRegistry, RecordingDeliverableBuilder, RecordingOcrService,
    RecordingProjectTracker, RecordingReindexService, StaticCatalogLookup,
    StaticTechMetadataExtractor,
};

/// Handles to every collaborator a workflow may call.
#[derive(Clone)]
pub struct Collaborators {
    pub archive: Arc<dyn ArchiveStore>,
    pub iiif: Arc<dyn IiifStore>,
    pub tech_meta: Arc<dyn TechMetadataExtractor>,
    pub ocr: Arc<dyn OcrService>,
    pub ocr_waits: Arc<OcrWaitRegistry>,
    pub reindex: Arc<dyn ReindexService>,
    pub catalog: Arc<dyn CatalogLookup>,
    pub projects: Arc<dyn ProjectTracker>,
    pub deliverables: Arc<dyn DeliverableBuilder>,
    pub preservation: Arc<dyn PreservationRegistry>,
    pub finding_aid: Arc<dyn FindingAidService>,
}

/// The in-memory fakes, kept concrete so tests can script and inspect them.
#[derive(Clone, Default)]
pub struct InMemoryCollaborators {
    pub archive: Arc<InMemoryArchiveStore>,
    pub iiif: Arc<InMemoryIiifStore>,
    pub tech_meta: Arc<StaticTechMetadataExtractor>,
    pub ocr: Arc<RecordingOcrService>,
    pub ocr_waits: Arc<OcrWaitRegistry>,
    pub reindex: Arc<RecordingReindexService>,
    pub catalog: Arc<StaticCatalogLookup>,
    pub projects: Arc<RecordingProjectTracker>,
    pub deliverables: Arc<RecordingDeliverableBuilder>,
    pub preservation: Arc<InMemoryPreservationRegistry>,
    pub finding_aid: Arc<InMemoryFindingAidService>,
}

impl InMemoryCollaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            archive: self.archive.clone(),
            iiif: self.iiif.clone(),
            tech_meta: self.tech_meta.clone(),
            ocr: self.ocr.clone(),
            ocr_waits: self.ocr_waits.clone(),
            reindex: self.reindex.clone(),
            catalog: self.catalog.clone(),
            projects: self.projects.clone(),
            deliverables: self.deliverables.clone(),
            preservation: self.preservation.clone(),
            finding_aid: self.finding_aid.clone(),
        }
    }
}
