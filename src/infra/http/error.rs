use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::duplicates::DedupeError;
use crate::application::error::ErrorReport;
use crate::application::posts::PostServiceError;
use crate::application::replica::ReplicaError;
use crate::application::repos::RepoError;
use crate::application::sync::{ContentStoreError, SyncError};

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const NOT_FOUND: &str = "not_found";
    pub const DUPLICATE: &str = "duplicate";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const INTEGRITY: &str = "integrity_error";
    pub const DB_TIMEOUT: &str = "db_timeout";
    pub const REPO: &str = "repo_error";
    pub const SYNC: &str = "sync_error";
    pub const REMOTE: &str = "remote_error";
    pub const NOT_CONFIGURED: &str = "not_configured";
    pub const REPLICA: &str = "replica_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, None)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let hint = self.hint.clone();
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport::from_message(
            "infra::http",
            self.status,
            format!("{}: {}", self.code, hint.as_deref().unwrap_or(self.message)),
        )
        .attach(&mut response);
        response
    }
}

pub fn repo_to_api(err: RepoError) -> ApiError {
    match err {
        RepoError::Duplicate { constraint } => ApiError::new(
            StatusCode::CONFLICT,
            codes::DUPLICATE,
            "Duplicate record",
            Some(constraint),
        ),
        RepoError::NotFound => ApiError::not_found("Resource not found"),
        RepoError::InvalidInput { message } => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Invalid input",
            Some(message),
        ),
        RepoError::Integrity { message } => ApiError::new(
            StatusCode::CONFLICT,
            codes::INTEGRITY,
            "Integrity constraint violated",
            Some(message),
        ),
        RepoError::Timeout => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::DB_TIMEOUT,
            "Database timeout",
            None,
        ),
        RepoError::Persistence(message) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::REPO,
            "Persistence error",
            Some(message),
        ),
    }
}

pub fn posts_to_api(err: PostServiceError) -> ApiError {
    match err {
        PostServiceError::ConstraintViolation(message) => {
            ApiError::bad_request("Invalid post", Some(message.to_string()))
        }
        PostServiceError::NotFound(_) => ApiError::not_found("Post not found"),
        PostServiceError::Slug(err) => ApiError::bad_request("Invalid slug", Some(err.to_string())),
        PostServiceError::Repo(err) => repo_to_api(err),
    }
}

fn store_to_api(err: ContentStoreError) -> ApiError {
    match err {
        ContentStoreError::Configuration(message) => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::NOT_CONFIGURED,
            "Content store not configured",
            Some(message),
        ),
        other => ApiError::new(
            StatusCode::BAD_GATEWAY,
            codes::REMOTE,
            "Content store request failed",
            Some(other.to_string()),
        ),
    }
}

pub fn sync_to_api(err: SyncError) -> ApiError {
    match err {
        SyncError::RemoteUnavailable => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::NOT_CONFIGURED,
            "GitHub is not configured",
            Some("set GITHUB_TOKEN and the repository owner/name".to_string()),
        ),
        SyncError::Store(err) => store_to_api(err),
        SyncError::Posts(err) => posts_to_api(err),
        SyncError::Repo(err) => repo_to_api(err),
    }
}

pub fn dedupe_to_api(err: DedupeError) -> ApiError {
    match err {
        DedupeError::Slug(err) => ApiError::new(
            StatusCode::CONFLICT,
            codes::DUPLICATE,
            "No free slug for merged post",
            Some(err.to_string()),
        ),
        DedupeError::Repo(err) => repo_to_api(err),
    }
}

pub fn replica_to_api(err: ReplicaError) -> ApiError {
    match err {
        ReplicaError::Configuration(message) => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::NOT_CONFIGURED,
            "Replica is not configured",
            Some(message),
        ),
        ReplicaError::UnknownTable(table) => {
            ApiError::bad_request("Unknown table", Some(table))
        }
        ReplicaError::Backup { path, source } => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::REPLICA,
            "Backup failed",
            Some(format!("{path}: {source}")),
        ),
        ReplicaError::Repo(err) => repo_to_api(err),
    }
}
