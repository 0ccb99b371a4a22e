use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tempfile::TempDir;

use digiserv_api::app::{build_app_with_services, AppServices};
use digiserv_api::config::AppConfig;
use digiserv_core::{JobId, MetadataId, OrderId, UnitId};
use digiserv_infra::collaborators::{InMemoryCollaborators, PackageState};
use digiserv_infra::units::InMemoryUnitStore;
use digiserv_jobs::{
    Event, EventLevel, InMemoryJobStore, JobStatus, JobStore, JobStoreError, Originator,
};
use digiserv_units::{
    DIGITAL_COLLECTION_BUILDING, DeliverableFormat, IntendedUse, MIN_IMAGE_BYTES, Metadata,
    MetadataKind, OcrHint, Order, OrderStatus, Unit, UnitStatus,
};

const ORDER: OrderId = OrderId::new(7);
const METADATA: MetadataId = MetadataId::new(3);

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
    units: Arc<InMemoryUnitStore>,
    fakes: InMemoryCollaborators,
    staging: TempDir,
    _work: TempDir,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(InMemoryJobStore::arc()).await
    }

    async fn spawn_with(jobs: Arc<dyn JobStore>) -> Self {
        let staging = tempfile::tempdir().expect("staging dir");
        let work = tempfile::tempdir().expect("work dir");
        let vars: HashMap<&str, String> = HashMap::from([
            ("COLLABORATORS", "memory".to_string()),
            ("STAGING_DIR", staging.path().display().to_string()),
            ("WORK_DIR", work.path().display().to_string()),
            ("SERVICE_URL", "http://digiserv.test".to_string()),
            ("OCR_TIMEOUT_SECS", "30".to_string()),
        ]);
        let config = AppConfig::from_lookup(|name| vars.get(name).cloned()).expect("config");

        let units = InMemoryUnitStore::arc();
        units.insert_order(Order::new(ORDER, OrderStatus::Requested));
        units.insert_intended_use(IntendedUse {
            id: DIGITAL_COLLECTION_BUILDING,
            description: "Digital Collection Building".to_string(),
            deliverable_format: DeliverableFormat::Zip,
        });
        let mut md = Metadata::new(METADATA, "uva-lib:3", "Field notebook", MetadataKind::Xml);
        md.ocr_hint = Some(OcrHint {
            id: 1,
            name: "Modern Font".to_string(),
            ocr_candidate: true,
        });
        md.ocr_language_hint = Some("eng".to_string());
        units.insert_metadata(md);

        let fakes = InMemoryCollaborators::new();
        let services = AppServices::new(jobs, units.clone(), fakes.collaborators(), &config);

        // Build app (same router as prod), but bind to an ephemeral port.
        let app = build_app_with_services(Arc::new(services));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            handle,
            units,
            fakes,
            staging,
            _work: work,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn add_unit(&self, id: i64, adjust: impl FnOnce(Unit) -> Unit) -> UnitId {
        let id = UnitId::new(id);
        self.units.insert_unit(adjust(Unit {
            metadata_id: Some(METADATA),
            intended_use_id: Some(DIGITAL_COLLECTION_BUILDING),
            ..Unit::approved(id, ORDER)
        }));
        id
    }

    fn stage(&self, unit: UnitId, pages: u32) {
        let dir = self.staging.path().join(format!("{:09}", unit.get()));
        std::fs::create_dir_all(&dir).unwrap();
        for seq in 1..=pages {
            let name = format!("{:09}_{seq:04}.tif", unit.get());
            std::fs::write(dir.join(name), vec![0u8; (MIN_IMAGE_BYTES * 2) as usize]).unwrap();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn start_finalize(client: &reqwest::Client, server: &TestServer, unit: UnitId) -> String {
    let res = client
        .post(server.url(&format!("/units/{unit}/finalize")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    res.text().await.unwrap()
}

async fn job_eventually_ended(client: &reqwest::Client, server: &TestServer, job_id: &str) -> Value {
    // Finalization runs in the background; poll until the job is terminal.
    for _ in 0..200 {
        let job: Value = client
            .get(server.url(&format!("/jobs/{job_id}")))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if !job["endedAt"].is_null() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {job_id} did not end within timeout");
}

#[tokio::test]
async fn health_is_public() {
    let server = TestServer::spawn().await;
    let res = reqwest::get(server.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn finalize_runs_to_a_finished_job() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let unit = server.add_unit(42, |u| u);
    server.stage(unit, 2);

    let job_id = start_finalize(&client, &server, unit).await;
    assert!(job_id.parse::<i64>().is_ok(), "plain-text job id, got {job_id}");

    let job = job_eventually_ended(&client, &server, &job_id).await;
    assert_eq!(job["name"], "FinalizeUnit");
    assert_eq!(job["status"], "finished");
    assert_eq!(job["failures"], 0);
    assert!(job["error"].is_null());
    assert_eq!(job["originator"], json!({"type": "Unit", "id": 42}));

    let events: Vec<Value> = client
        .get(server.url(&format!("/jobs/{job_id}/events")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let last = events.last().expect("events");
    assert_eq!(last["level"], "info");
    assert_eq!(last["text"], "job finished");

    let listed: Vec<Value> = client
        .get(server.url("/jobs?originator_type=Unit&originator_id=42"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"].to_string(), job_id);

    assert_eq!(server.fakes.archive.puts().len(), 2);
}

#[tokio::test]
async fn rejected_finalize_requests_create_no_job() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let reorder = server.add_unit(43, |u| Unit { reorder: true, ..u });
    let done = server.add_unit(44, |u| Unit {
        status: UnitStatus::Done,
        ..u
    });

    let cases = [
        ("/units/999/finalize".to_string(), StatusCode::NOT_FOUND, "not_found"),
        ("/units/abc/finalize".to_string(), StatusCode::BAD_REQUEST, "invalid_id"),
        (format!("/units/{reorder}/finalize"), StatusCode::BAD_REQUEST, "reorder"),
        (format!("/units/{done}/finalize"), StatusCode::BAD_REQUEST, "invalid_status"),
    ];
    for (path, status, code) in cases {
        let res = client.post(server.url(&path)).send().await.unwrap();
        assert_eq!(res.status(), status, "{path}");
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], code, "{path}");
    }

    let listed: Vec<Value> = client
        .get(server.url("/jobs"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn ocr_callback_releases_the_waiting_job() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let unit = server.add_unit(45, |u| Unit {
        ocr_master_files: true,
        ..u
    });
    server.stage(unit, 1);

    let job_id = start_finalize(&client, &server, unit).await;
    let id = job_id.parse().unwrap();
    for _ in 0..200 {
        if server.fakes.ocr_waits.is_pending(id) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(server.fakes.ocr_waits.is_pending(id), "job never waited for OCR");

    let res = client
        .post(server.url(&format!("/units/{unit}/finalize")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .post(server.url(&format!("/callbacks/ocr/{job_id}")))
        .json(&json!({"status": "success"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["delivered"], true);

    let job = job_eventually_ended(&client, &server, &job_id).await;
    assert_eq!(job["status"], "finished");
    let requests = server.fakes.ocr.requests();
    assert_eq!(
        requests[0].callback_url,
        format!("http://digiserv.test/callbacks/ocr/{job_id}")
    );
}

#[tokio::test]
async fn unknown_jobs_are_404() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for path in ["/jobs/999", "/jobs/999/events"] {
        let res = client.get(server.url(path)).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "{path}");
    }

    let res = client
        .post(server.url("/callbacks/ocr/999"))
        .json(&json!({"status": "failure", "message": "engine crashed"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(server.url("/jobs?originator_type=Unit"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn preservation_status_and_finding_aid_requests() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    server
        .fakes
        .preservation
        .script("uva-lib_3.tar", vec![PackageState::Processing]);

    let res = client
        .get(server.url(&format!("/metadata/{METADATA}/preservation")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let status: Value = res.json().await.unwrap();
    assert_eq!(status["package"], "uva-lib_3.tar");
    assert_eq!(status["status"], "processing");

    let res = client
        .get(server.url("/metadata/404/preservation"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .post(server.url(&format!("/metadata/{METADATA}/finding-aid")))
        .json(&json!({"archival_object_uri": "  "}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(server.url(&format!("/metadata/{METADATA}/finding-aid")))
        .json(&json!({"archival_object_uri": "/repositories/3/archival_objects/404"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let job_id = res.text().await.unwrap();
    let job = job_eventually_ended(&client, &server, &job_id).await;
    assert_eq!(job["name"], "PublishToFindingAid");
    assert_eq!(job["status"], "failure");
    assert_eq!(job["originator"], json!({"type": "Metadata", "id": 3}));
}

/// Job store whose database is gone.
struct UnavailableJobStore;

impl UnavailableJobStore {
    fn down<T>() -> Result<T, JobStoreError> {
        Err(JobStoreError::Storage("connection refused".to_string()))
    }
}

#[async_trait]
impl JobStore for UnavailableJobStore {
    async fn create(&self, _: &str, _: Originator) -> Result<JobStatus, JobStoreError> {
        Self::down()
    }

    async fn get(&self, _: JobId) -> Result<Option<JobStatus>, JobStoreError> {
        Self::down()
    }

    async fn list(&self, _: Option<Originator>, _: usize) -> Result<Vec<JobStatus>, JobStoreError> {
        Self::down()
    }

    async fn events(&self, _: JobId) -> Result<Vec<Event>, JobStoreError> {
        Self::down()
    }

    async fn append_event(&self, _: JobId, _: EventLevel, _: &str) -> Result<(), JobStoreError> {
        Self::down()
    }

    async fn finish(&self, _: JobId) -> Result<bool, JobStoreError> {
        Self::down()
    }
}

#[tokio::test]
async fn ocr_callback_releases_the_wait_when_the_job_store_fails() {
    let server = TestServer::spawn_with(Arc::new(UnavailableJobStore)).await;
    let client = reqwest::Client::new();
    let job = JobId::new(5);
    let wait = server.fakes.ocr_waits.register(job);

    let res = client
        .post(server.url(&format!("/callbacks/ocr/{job}")))
        .json(&json!({"status": "success"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

    assert!(!server.fakes.ocr_waits.is_pending(job));
    let outcome = tokio::time::timeout(Duration::from_secs(1), wait)
        .await
        .expect("waiting job was not released");
    assert!(outcome.is_err(), "no outcome is delivered for an unverified job");
}
