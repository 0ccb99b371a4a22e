use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde_json::json;
use tracing::{info, warn};

use digiserv_core::JobId;
use digiserv_infra::collaborators::OcrOutcome;
use digiserv_jobs::JobTracker;

use crate::app::dto::{OcrCallbackRequest, OcrCallbackStatus};
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/ocr/:job_id", post(ocr_finished))
}

/// OCR completion callback. The pending wait is claimed before anything
/// can fail, so an early return still releases the waiting job.
pub async fn ocr_finished(
    Extension(services): Extension<Arc<AppServices>>,
    Path(job_id): Path<String>,
    Json(body): Json<OcrCallbackRequest>,
) -> axum::response::Response {
    let job_id: JobId = match errors::parse_id(&job_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let wait = services.collaborators.ocr_waits.claim(job_id);

    match services.jobs.get(job_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return errors::json_error(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("job {job_id} not found"),
            );
        }
        Err(e) => {
            warn!(job_id = %job_id, error = %e, "OCR callback could not load its job");
            return errors::job_store_error_to_response(e);
        }
    }

    let tracker = JobTracker::bound(services.jobs.clone(), job_id);
    let outcome = match body.status {
        OcrCallbackStatus::Success => {
            tracker.info("OCR finished").await;
            OcrOutcome::Success
        }
        OcrCallbackStatus::Failure => {
            let reason = body.message.unwrap_or_else(|| "no reason given".to_string());
            tracker.error(format!("OCR failed: {reason}")).await;
            OcrOutcome::Failure(reason)
        }
    };

    let delivered = wait.is_some_and(|wait| wait.deliver(outcome));
    if delivered {
        info!(job_id = %job_id, "OCR callback delivered");
    } else {
        warn!(job_id = %job_id, "OCR callback arrived with no job waiting");
    }

    Json(json!({ "jobId": job_id, "delivered": delivered })).into_response()
}
