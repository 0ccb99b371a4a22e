use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Router,
};

use digiserv_core::UnitId;

use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/:id/finalize", post(finalize_unit))
}

/// Start finalization; answers with the Job ID as plain text.
pub async fn finalize_unit(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let unit_id: UnitId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.finalizer.start(unit_id).await {
        Ok(spawned) => (StatusCode::OK, spawned.job_id.to_string()).into_response(),
        Err(e) => errors::start_error_to_response(e),
    }
}
