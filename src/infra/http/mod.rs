//! HTTP surface for the admin tooling.

mod error;
mod handlers;
mod middleware;

pub use error::{ApiError, ApiErrorBody};

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::application::duplicates::DedupeService;
use crate::application::posts::PostService;
use crate::application::replica::ReplicaService;
use crate::application::sync::SyncService;
use crate::application::taxonomy::TaxonomyService;
use crate::infra::db::SqliteRepositories;

pub use self::middleware::REQUEST_ID_HEADER;

#[derive(Clone)]
pub struct AdminApiState {
    pub db: Arc<SqliteRepositories>,
    pub posts: Arc<PostService>,
    pub taxonomy: Arc<TaxonomyService>,
    pub sync: Arc<SyncService>,
    pub dedupe: Arc<DedupeService>,
    pub replica: Arc<ReplicaService>,
}

pub fn build_router(state: AdminApiState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/categories", get(handlers::list_categories))
        .route("/api/posts/{slug}", get(handlers::get_post))
        .route("/api/sync/status", get(handlers::sync_status))
        .route("/api/sync", post(handlers::run_sync))
        .route("/api/admin/dedupe", post(handlers::run_dedupe))
        .route("/api/admin/sync-to-prod", post(handlers::sync_to_prod))
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::trace_requests))
}
