use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use digiserv_infra::archival::ArchivalStartError;
use digiserv_infra::finalize::StartError;
use digiserv_jobs::JobStoreError;
use digiserv_units::FinalizeRejection;

pub fn start_error_to_response(err: StartError) -> axum::response::Response {
    match err {
        StartError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        StartError::Rejected(ref rejection) => match rejection {
            FinalizeRejection::Reorder(_) => {
                json_error(StatusCode::BAD_REQUEST, "reorder", err.to_string())
            }
            FinalizeRejection::InvalidStatus { .. } => {
                json_error(StatusCode::BAD_REQUEST, "invalid_status", err.to_string())
            }
            FinalizeRejection::AlreadyFinalizing(_) => {
                json_error(StatusCode::CONFLICT, "already_finalizing", err.to_string())
            }
        },
        StartError::Store(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            e.to_string(),
        ),
        StartError::Job(e) => job_store_error_to_response(e),
    }
}

pub fn archival_error_to_response(err: ArchivalStartError) -> axum::response::Response {
    match err {
        ArchivalStartError::NotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "not_found", err.to_string())
        }
        ArchivalStartError::Store(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            e.to_string(),
        ),
        ArchivalStartError::Job(e) => job_store_error_to_response(e),
        ArchivalStartError::Collaborator(e) => {
            json_error(StatusCode::BAD_GATEWAY, "collaborator_error", e.to_string())
        }
    }
}

pub fn job_store_error_to_response(err: JobStoreError) -> axum::response::Response {
    match err {
        JobStoreError::NotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "not_found", err.to_string())
        }
        JobStoreError::Storage(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a numeric path id, answering 400 when it is malformed.
pub fn parse_id<T: std::str::FromStr>(raw: &str) -> Result<T, axum::response::Response> {
    raw.parse::<T>().map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("'{raw}' is not a valid id"),
        )
    })
}
