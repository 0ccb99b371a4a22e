use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use digiserv_infra::archival::{ArchivalJobs, ArchivalSettings};
use digiserv_infra::collaborators::{
    http, Collaborators, DirectProjectTracker, FsArchiveStore, FsDeliverableBuilder, FsIiifStore,
    HttpCatalogLookup, HttpFindingAidService, HttpOcrService, HttpPreservationRegistry,
    HttpProjectTracker, HttpReindexService, IdentifyExtractor, InMemoryCollaborators,
    OcrWaitRegistry, ProjectTracker,
};
use digiserv_infra::db;
use digiserv_infra::finalize::{FinalizeSettings, Finalizer};
use digiserv_infra::jobs::PostgresJobStore;
use digiserv_infra::units::{InMemoryUnitStore, PostgresUnitStore, UnitStore};
use digiserv_jobs::{InMemoryJobStore, JobStore};

use crate::config::{AppConfig, CollaboratorMode, ProjectTrackerKind};

/// Everything the handlers need, shared behind one `Arc`.
#[derive(Clone)]
pub struct AppServices {
    pub jobs: Arc<dyn JobStore>,
    pub units: Arc<dyn UnitStore>,
    pub collaborators: Collaborators,
    pub finalizer: Finalizer,
    pub archival: ArchivalJobs,
}

impl AppServices {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        units: Arc<dyn UnitStore>,
        collaborators: Collaborators,
        config: &AppConfig,
    ) -> Self {
        let finalizer = Finalizer::new(
            jobs.clone(),
            units.clone(),
            collaborators.clone(),
            FinalizeSettings {
                staging_root: config.staging_dir.clone(),
                work_root: config.work_dir.clone(),
                service_url: config.service_url.clone(),
                iiif_batches: config.iiif_batches,
                ocr_timeout: config.ocr_timeout,
            },
        );
        let archival = ArchivalJobs::new(
            jobs.clone(),
            units.clone(),
            collaborators.clone(),
            ArchivalSettings {
                package_dir: config.package_dir.clone(),
                poll_interval: config.preservation_poll_interval,
                max_polls: config.preservation_max_polls,
                iiif_manifest_url: config.iiif_manifest_url.clone(),
            },
        );
        Self {
            jobs,
            units,
            collaborators,
            finalizer,
            archival,
        }
    }
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let (jobs, units) = match &config.database_url {
        Some(url) => {
            let pool = db::connect(url, config.db_max_connections)
                .await
                .context("failed to connect to the database")?;
            db::migrate(&pool).await.context("failed to apply the schema")?;
            info!("using postgres stores");
            let jobs: Arc<dyn JobStore> = Arc::new(PostgresJobStore::new(pool.clone()));
            let units: Arc<dyn UnitStore> = Arc::new(PostgresUnitStore::new(pool));
            (jobs, units)
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory stores");
            let jobs: Arc<dyn JobStore> = InMemoryJobStore::arc();
            let units: Arc<dyn UnitStore> = InMemoryUnitStore::arc();
            (jobs, units)
        }
    };

    let collaborators = match config.collaborators {
        CollaboratorMode::Live => live_collaborators(config, units.clone())?,
        CollaboratorMode::Memory => {
            warn!("COLLABORATORS=memory; external systems are simulated");
            InMemoryCollaborators::new().collaborators()
        }
    };

    Ok(AppServices::new(jobs, units, collaborators, config))
}

fn live_collaborators(
    config: &AppConfig,
    units: Arc<dyn UnitStore>,
) -> anyhow::Result<Collaborators> {
    let client = http::client(config.http_timeout).context("failed to build the HTTP client")?;

    let projects: Arc<dyn ProjectTracker> = match config.project_tracker {
        ProjectTrackerKind::Direct => Arc::new(DirectProjectTracker::new(units)),
        ProjectTrackerKind::Http => {
            Arc::new(HttpProjectTracker::new(client.clone(), &config.projects_url))
        }
    };

    Ok(Collaborators {
        archive: Arc::new(FsArchiveStore::new(&config.archive_dir)),
        iiif: Arc::new(FsIiifStore::new(&config.iiif_dir, &config.image_tool)),
        tech_meta: Arc::new(IdentifyExtractor::new(&config.image_tool)),
        ocr: Arc::new(HttpOcrService::new(client.clone(), &config.ocr_url)),
        ocr_waits: Arc::new(OcrWaitRegistry::new()),
        reindex: Arc::new(HttpReindexService::new(client.clone(), &config.reindex_url)),
        catalog: Arc::new(HttpCatalogLookup::new(client.clone(), &config.catalog_url)),
        projects,
        deliverables: Arc::new(FsDeliverableBuilder::new(
            &config.delivery_dir,
            &config.image_tool,
        )),
        preservation: Arc::new(HttpPreservationRegistry::new(
            client.clone(),
            &config.preservation.url,
            &config.preservation.user,
            &config.preservation.secret,
        )),
        finding_aid: Arc::new(HttpFindingAidService::new(
            client,
            &config.finding_aid.url,
            &config.finding_aid.user,
            &config.finding_aid.secret,
            config.finding_aid_session_ttl,
        )),
    })
}
