use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use digiserv_core::MetadataId;
use digiserv_infra::archival::{package_name, ArchivalStartError};

use crate::app::dto::{FindingAidRequest, PackageStatusView};
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/:id/preservation", post(submit_preservation).get(preservation_status))
        .route("/:id/finding-aid", post(publish_to_finding_aid))
}

pub async fn submit_preservation(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: MetadataId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.archival.submit_preservation(id).await {
        Ok(spawned) => (StatusCode::OK, spawned.job_id.to_string()).into_response(),
        Err(e) => errors::archival_error_to_response(e),
    }
}

pub async fn preservation_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: MetadataId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let metadata = match services.units.metadata(id).await {
        Ok(Some(md)) => md,
        Ok(None) => return errors::archival_error_to_response(ArchivalStartError::NotFound(id)),
        Err(e) => return errors::archival_error_to_response(e.into()),
    };
    match services.archival.preservation_status(id).await {
        Ok(status) => Json(PackageStatusView::new(package_name(&metadata.pid), status)).into_response(),
        Err(e) => errors::archival_error_to_response(e),
    }
}

pub async fn publish_to_finding_aid(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<FindingAidRequest>,
) -> axum::response::Response {
    let id: MetadataId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let uri = body.archival_object_uri.trim();
    if uri.is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_archival_object",
            "archival_object_uri must not be empty",
        );
    }

    match services.archival.publish_to_finding_aid(id, uri.to_string()).await {
        Ok(spawned) => (StatusCode::OK, spawned.job_id.to_string()).into_response(),
        Err(e) => errors::archival_error_to_response(e),
    }
}
