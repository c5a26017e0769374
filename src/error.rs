use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{audit::AuditError, repository::RepoError, storage::StorageError};

const PROBLEM_BASE: &str = "https://lms-219.dev/problems";

/// ValidationIssue
///
/// One rejected field of a request body. `path` is the dotted field path, or `root`
/// when the body as a whole could not be read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// ProblemDetails
///
/// The RFC 7807 body returned for every API failure.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[ts(optional)]
    pub issues: Option<Vec<ValidationIssue>>,
}

/// ApiError
///
/// The error taxonomy surfaced at the HTTP boundary. Failures from the persistence,
/// audit and storage layers collapse into a generic 500 so no internal detail leaks.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("active session required")]
    Unauthorized,

    #[error("insufficient role")]
    Forbidden,

    #[error("request failed validation")]
    Validation(Vec<ValidationIssue>),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Repository(#[from] RepoError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Repository(_) | ApiError::Audit(_) | ApiError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Builds the Problem Details body for this error.
    pub fn problem(&self) -> ProblemDetails {
        let status = self.status();
        let (slug, title, detail, issues) = match self {
            ApiError::Unauthorized => (
                "unauthorized",
                "Unauthorized",
                "Active session required.".to_string(),
                None,
            ),
            ApiError::Forbidden => (
                "forbidden",
                "Forbidden",
                "You do not have access to this resource.".to_string(),
                None,
            ),
            ApiError::Validation(issues) => (
                "invalid-request",
                "Bad Request",
                "Request body failed validation.".to_string(),
                Some(issues.clone()),
            ),
            ApiError::BadRequest(detail) => {
                ("invalid-request", "Bad Request", detail.clone(), None)
            }
            ApiError::NotFound(detail) => ("not-found", "Not Found", detail.clone(), None),
            ApiError::Repository(_) | ApiError::Audit(_) | ApiError::Storage(_) => (
                "internal-error",
                "Internal Server Error",
                "An unexpected error occurred.".to_string(),
                None,
            ),
        };

        ProblemDetails {
            problem_type: format!("{}/{}", PROBLEM_BASE, slug),
            title: title.to_string(),
            status: status.as_u16(),
            detail,
            issues,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed with internal error");
        }

        let mut response = (status, Json(self.problem())).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}
