//! In-memory collaborators for tests and local development.
//!
//! Each fake records the calls it receives and can be told to fail.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use digiserv_core::{ProjectId, UnitId};
use digiserv_units::ImageTechMeta;

use super::archive::ArchiveStore;
use super::catalog::CatalogLookup;
use super::checksum::sha256_file;
use super::deliverables::{DeliverableBuilder, DeliverableRequest};
use super::finding_aid::{ArchivalObject, FindingAidService, NewDigitalObject};
use super::iiif::IiifStore;
use super::ocr::{OcrRequest, OcrService};
use super::preservation::{PackageState, PackageStatus, PreservationRegistry};
use super::project::ProjectTracker;
use super::reindex::{ReindexService, ReindexTarget};
use super::techmeta::TechMetadataExtractor;
use super::CollaboratorError;

fn injected(op: &'static str, entity: impl Into<String>) -> CollaboratorError {
    CollaboratorError::invalid(op, entity, "injected failure")
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
pub struct InMemoryArchiveStore {
    files: Mutex<HashMap<(UnitId, String), String>>,
    puts: Mutex<Vec<String>>,
    fail: Mutex<bool>,
}

impl InMemoryArchiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_puts(&self, fail: bool) {
        *lock(&self.fail) = fail;
    }

    /// Filenames passed to `put`, in call order.
    pub fn puts(&self) -> Vec<String> {
        lock(&self.puts).clone()
    }

    pub fn contains(&self, unit: UnitId, filename: &str) -> bool {
        lock(&self.files).contains_key(&(unit, filename.to_string()))
    }
}

#[async_trait]
impl ArchiveStore for InMemoryArchiveStore {
    async fn put(&self, source: &Path, unit: UnitId, filename: &str) -> Result<String, CollaboratorError> {
        lock(&self.puts).push(filename.to_string());
        if *lock(&self.fail) {
            return Err(injected("archive", filename));
        }
        let checksum = sha256_file(source).await?;
        lock(&self.files).insert((unit, filename.to_string()), checksum.clone());
        Ok(checksum)
    }

    async fn remove(&self, unit: UnitId, filename: &str) -> Result<(), CollaboratorError> {
        lock(&self.files).remove(&(unit, filename.to_string()));
        Ok(())
    }

    async fn rename(
        &self,
        unit: UnitId,
        old: &str,
        new: &str,
        expected_checksum: &str,
    ) -> Result<(), CollaboratorError> {
        let mut files = lock(&self.files);
        let Some(checksum) = files.remove(&(unit, old.to_string())) else {
            return Err(CollaboratorError::invalid("archive rename", old, "not archived"));
        };
        if checksum != expected_checksum {
            files.insert((unit, old.to_string()), checksum);
            return Err(CollaboratorError::invalid("archive rename", old, "checksum mismatch"));
        }
        files.insert((unit, new.to_string()), checksum);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryIiifStore {
    ids: Mutex<HashSet<String>>,
    publishes: Mutex<Vec<String>>,
    fail_ids: Mutex<HashSet<String>>,
}

impl InMemoryIiifStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `publish` fail for this id.
    pub fn fail_on(&self, id: impl Into<String>) {
        lock(&self.fail_ids).insert(id.into());
    }

    pub fn clear_failures(&self) {
        lock(&self.fail_ids).clear();
    }

    /// Ids passed to `publish`, in call order.
    pub fn publishes(&self) -> Vec<String> {
        lock(&self.publishes).clone()
    }
}

#[async_trait]
impl IiifStore for InMemoryIiifStore {
    async fn exists(&self, id: &str) -> Result<bool, CollaboratorError> {
        Ok(lock(&self.ids).contains(id))
    }

    async fn publish(&self, _source: &Path, id: &str, _overwrite: bool) -> Result<(), CollaboratorError> {
        lock(&self.publishes).push(id.to_string());
        if lock(&self.fail_ids).contains(id) {
            return Err(injected("iiif publish", id));
        }
        lock(&self.ids).insert(id.to_string());
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), CollaboratorError> {
        lock(&self.ids).remove(id);
        Ok(())
    }
}

/// Returns the same metadata for every image unless overridden per filename.
#[derive(Debug)]
pub struct StaticTechMetadataExtractor {
    default: ImageTechMeta,
    overrides: Mutex<HashMap<String, ImageTechMeta>>,
}

impl Default for StaticTechMetadataExtractor {
    fn default() -> Self {
        Self {
            default: ImageTechMeta {
                width: 2400,
                height: 3600,
                colorspace: "sRGB".to_string(),
                compression: "None".to_string(),
                resolution: Some(600),
                capture_date: None,
            },
            overrides: Mutex::new(HashMap::new()),
        }
    }
}

impl StaticTechMetadataExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, filename: impl Into<String>, meta: ImageTechMeta) {
        lock(&self.overrides).insert(filename.into(), meta);
    }
}

#[async_trait]
impl TechMetadataExtractor for StaticTechMetadataExtractor {
    async fn extract(&self, path: &Path) -> Result<ImageTechMeta, CollaboratorError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(lock(&self.overrides)
            .get(&name)
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }
}

#[derive(Debug, Default)]
pub struct RecordingOcrService {
    requests: Mutex<Vec<OcrRequest>>,
    fail: Mutex<bool>,
}

impl RecordingOcrService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_requests(&self, fail: bool) {
        *lock(&self.fail) = fail;
    }

    pub fn requests(&self) -> Vec<OcrRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl OcrService for RecordingOcrService {
    async fn request_ocr(&self, request: &OcrRequest) -> Result<(), CollaboratorError> {
        lock(&self.requests).push(request.clone());
        if *lock(&self.fail) {
            return Err(injected("request ocr", &request.pid));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingReindexService {
    targets: Mutex<Vec<ReindexTarget>>,
    fail: Mutex<bool>,
}

impl RecordingReindexService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_requests(&self, fail: bool) {
        *lock(&self.fail) = fail;
    }

    pub fn targets(&self) -> Vec<ReindexTarget> {
        lock(&self.targets).clone()
    }
}

#[async_trait]
impl ReindexService for RecordingReindexService {
    async fn reindex(&self, target: &ReindexTarget) -> Result<(), CollaboratorError> {
        lock(&self.targets).push(target.clone());
        if *lock(&self.fail) {
            return Err(injected("reindex", target.to_string()));
        }
        Ok(())
    }
}

/// Catalog with fixed publication years. Unknown keys have no year.
#[derive(Debug, Default)]
pub struct StaticCatalogLookup {
    years: Mutex<HashMap<String, i32>>,
}

impl StaticCatalogLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_year(&self, catalog_key: impl Into<String>, year: i32) {
        lock(&self.years).insert(catalog_key.into(), year);
    }
}

#[async_trait]
impl CatalogLookup for StaticCatalogLookup {
    async fn publication_year(&self, catalog_key: &str) -> Result<Option<i32>, CollaboratorError> {
        Ok(lock(&self.years).get(catalog_key).copied())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectReport {
    Succeeded { project: ProjectId, unit: UnitId },
    Failed { project: ProjectId, unit: UnitId, reason: String },
}

/// Records reports without touching any unit.
#[derive(Debug, Default)]
pub struct RecordingProjectTracker {
    reports: Mutex<Vec<ProjectReport>>,
}

impl RecordingProjectTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<ProjectReport> {
        lock(&self.reports).clone()
    }
}

#[async_trait]
impl ProjectTracker for RecordingProjectTracker {
    async fn finalization_succeeded(
        &self,
        project: ProjectId,
        unit: UnitId,
        _minutes: u64,
    ) -> Result<(), CollaboratorError> {
        lock(&self.reports).push(ProjectReport::Succeeded { project, unit });
        Ok(())
    }

    async fn finalization_failed(
        &self,
        project: ProjectId,
        unit: UnitId,
        reason: &str,
        _minutes: u64,
    ) -> Result<(), CollaboratorError> {
        lock(&self.reports).push(ProjectReport::Failed {
            project,
            unit,
            reason: reason.to_string(),
        });
        Ok(())
    }
}

/// Records requests and reports a path without writing anything.
#[derive(Debug, Default)]
pub struct RecordingDeliverableBuilder {
    requests: Mutex<Vec<DeliverableRequest>>,
    fail: Mutex<bool>,
}

impl RecordingDeliverableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_builds(&self, fail: bool) {
        *lock(&self.fail) = fail;
    }

    pub fn requests(&self) -> Vec<DeliverableRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl DeliverableBuilder for RecordingDeliverableBuilder {
    async fn build(&self, request: &DeliverableRequest) -> Result<PathBuf, CollaboratorError> {
        lock(&self.requests).push(request.clone());
        if *lock(&self.fail) {
            return Err(injected("build deliverable", format!("unit {}", request.unit_id)));
        }
        Ok(PathBuf::from(format!("order_{}", request.order_id)).join(request.file_name()))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPreservationRegistry {
    submitted: Mutex<Vec<String>>,
    statuses: Mutex<HashMap<String, Vec<PackageState>>>,
}

impl InMemoryPreservationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the states `query_status` reports for a package; the last one repeats.
    pub fn script(&self, package: impl Into<String>, states: Vec<PackageState>) {
        lock(&self.statuses).insert(package.into(), states);
    }

    pub fn submitted(&self) -> Vec<String> {
        lock(&self.submitted).clone()
    }
}

#[async_trait]
impl PreservationRegistry for InMemoryPreservationRegistry {
    async fn submit_package(&self, path: &Path) -> Result<(), CollaboratorError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        lock(&self.submitted).push(name);
        Ok(())
    }

    async fn query_status(&self, package_name: &str) -> Result<PackageStatus, CollaboratorError> {
        let mut statuses = lock(&self.statuses);
        let Some(queue) = statuses.get_mut(package_name) else {
            return Err(CollaboratorError::invalid("query package", package_name, "unknown package"));
        };
        let state = if queue.len() > 1 {
            queue.remove(0)
        } else {
            queue.first().copied().unwrap_or(PackageState::Pending)
        };
        Ok(PackageStatus {
            status: state,
            processed_at: state.is_final().then(chrono::Utc::now),
        })
    }
}

#[derive(Debug, Default)]
struct FindingAidState {
    archival_objects: HashMap<String, ArchivalObject>,
    digital_objects: HashMap<(String, String), String>,
    links: Vec<(String, String)>,
    created: usize,
}

#[derive(Debug, Default)]
pub struct InMemoryFindingAidService {
    state: Mutex<FindingAidState>,
}

impl InMemoryFindingAidService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_archival_object(&self, object: ArchivalObject) {
        lock(&self.state)
            .archival_objects
            .insert(object.uri.clone(), object);
    }

    /// (archival object, digital object) pairs linked so far.
    pub fn links(&self) -> Vec<(String, String)> {
        lock(&self.state).links.clone()
    }

    pub fn created_count(&self) -> usize {
        lock(&self.state).created
    }
}

#[async_trait]
impl FindingAidService for InMemoryFindingAidService {
    async fn lookup_archival_object(&self, uri: &str) -> Result<ArchivalObject, CollaboratorError> {
        lock(&self.state)
            .archival_objects
            .get(uri)
            .cloned()
            .ok_or_else(|| CollaboratorError::Http {
                op: "lookup archival object",
                entity: uri.to_string(),
                status: 404,
                body: "not found".to_string(),
            })
    }

    async fn find_digital_object(
        &self,
        repository: &str,
        identifier: &str,
    ) -> Result<Option<String>, CollaboratorError> {
        Ok(lock(&self.state)
            .digital_objects
            .get(&(repository.to_string(), identifier.to_string()))
            .cloned())
    }

    async fn create_digital_object(&self, object: &NewDigitalObject) -> Result<String, CollaboratorError> {
        let mut state = lock(&self.state);
        state.created += 1;
        let uri = format!("{}/digital_objects/{}", object.repository, state.created);
        state
            .digital_objects
            .insert((object.repository.clone(), object.identifier.clone()), uri.clone());
        Ok(uri)
    }

    async fn link_digital_object(
        &self,
        archival_object_uri: &str,
        digital_object_uri: &str,
    ) -> Result<(), CollaboratorError> {
        let mut state = lock(&self.state);
        let link = (archival_object_uri.to_string(), digital_object_uri.to_string());
        if !state.links.contains(&link) {
            state.links.push(link);
        }
        Ok(())
    }
}
