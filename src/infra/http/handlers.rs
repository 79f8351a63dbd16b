//! Admin API handlers.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::application::error::ErrorReport;
use crate::domain::entities::PostWithTaxonomy;
use crate::domain::types::SyncDirection;

use super::AdminApiState;
use super::error::{
    ApiError, dedupe_to_api, posts_to_api, replica_to_api, sync_to_api,
};

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub direction: SyncDirection,
}

#[derive(Debug, Default, Deserialize)]
pub struct DedupeRequest {
    #[serde(default)]
    pub apply: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReplicaPushRequest {
    #[serde(default)]
    pub tables: Option<Vec<String>>,
    #[serde(default)]
    pub dry_run: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct PostResponse {
    #[serde(flatten)]
    pub entry: PostWithTaxonomy,
    /// The alias used in the request when it differs from the current slug.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirected_from: Option<String>,
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request("Invalid request body", Some(rejection.body_text())))
}

pub async fn health(State(state): State<AdminApiState>) -> Response {
    match state.db.health_check().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

pub async fn list_categories(State(state): State<AdminApiState>) -> impl IntoResponse {
    Json(state.taxonomy.categories().await)
}

pub async fn get_post(
    State(state): State<AdminApiState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state
        .posts
        .resolve_slug(&slug)
        .await
        .map_err(posts_to_api)?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;

    let redirected_from = (entry.post.slug != slug).then_some(slug);
    Ok(Json(PostResponse {
        entry,
        redirected_from,
    }))
}

pub async fn sync_status(
    State(state): State<AdminApiState>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state.sync.status().await.map_err(sync_to_api)?;
    Ok(Json(status))
}

pub async fn run_sync(
    State(state): State<AdminApiState>,
    payload: Result<Json<SyncRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = json_body(payload)?;
    let outcome = state
        .sync
        .sync(request.direction)
        .await
        .map_err(sync_to_api)?;
    Ok(Json(outcome))
}

pub async fn run_dedupe(
    State(state): State<AdminApiState>,
    payload: Result<Json<DedupeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = json_body(payload)?;
    let report = state
        .dedupe
        .process_duplicate_groups(request.apply)
        .await
        .map_err(dedupe_to_api)?;
    Ok(Json(report))
}

pub async fn sync_to_prod(
    State(state): State<AdminApiState>,
    payload: Result<Json<ReplicaPushRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = json_body(payload)?;
    let tables = request.tables.unwrap_or_default();
    let report = state
        .replica
        .push(&tables, request.dry_run.unwrap_or(false))
        .await
        .map_err(replica_to_api)?;
    Ok(Json(report))
}
