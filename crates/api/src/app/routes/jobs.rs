use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use digiserv_core::JobId;
use digiserv_jobs::Originator;

use crate::app::dto::{self, EventView, JobStatusView};
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_jobs))
        .route("/:id", get(get_job))
        .route("/:id/events", get(get_job_events))
}

pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: JobId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.jobs.get(id).await {
        Ok(Some(job)) => Json(JobStatusView::from(job)).into_response(),
        Ok(None) => errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("job {id} not found"),
        ),
        Err(e) => errors::job_store_error_to_response(e),
    }
}

pub async fn get_job_events(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: JobId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.jobs.events(id).await {
        Ok(events) => {
            Json(events.into_iter().map(EventView::from).collect::<Vec<_>>()).into_response()
        }
        Err(e) => errors::job_store_error_to_response(e),
    }
}

pub async fn list_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::JobListQuery>,
) -> axum::response::Response {
    let originator = match (query.originator_type.as_deref(), query.originator_id) {
        (None, None) => None,
        (Some(kind), Some(id)) => match Originator::from_parts(kind, id) {
            Ok(originator) => Some(originator),
            Err(e) => {
                return errors::json_error(StatusCode::BAD_REQUEST, "invalid_originator", e.to_string());
            }
        },
        _ => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_originator",
                "originator_type and originator_id must be given together",
            );
        }
    };
    let limit = query
        .limit
        .unwrap_or(dto::DEFAULT_JOB_LIMIT)
        .clamp(1, dto::MAX_JOB_LIMIT);

    match services.jobs.list(originator, limit).await {
        Ok(jobs) => {
            Json(jobs.into_iter().map(JobStatusView::from).collect::<Vec<_>>()).into_response()
        }
        Err(e) => errors::job_store_error_to_response(e),
    }
}
