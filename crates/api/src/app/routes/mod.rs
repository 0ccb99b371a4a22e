use axum::Router;

pub mod callbacks;
pub mod jobs;
pub mod metadata;
pub mod system;
pub mod units;

/// Router for every endpoint that needs `AppServices`.
pub fn router() -> Router {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/units", units::router())
        .nest("/metadata", metadata::router())
        .nest("/callbacks", callbacks::router())
}
