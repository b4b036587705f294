//! Mapping from engine failures to HTTP responses.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rcaflow_engine::{FailureKind, WorkflowError};
use tracing::error;

/// Any failure a handler can return. Rendered as
/// `{"error": <message>, "kind": <failure kind>, "detail": <structured detail or null>}`.
#[derive(Debug)]
pub(crate) struct ApiError(pub(crate) WorkflowError);

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        ApiError(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(WorkflowError::ValidationFailed(rejection.body_text()))
    }
}

pub(crate) fn status_for(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::Unauthorized => StatusCode::UNAUTHORIZED,
        FailureKind::Forbidden => StatusCode::FORBIDDEN,
        FailureKind::NotFound => StatusCode::NOT_FOUND,
        FailureKind::PreconditionFailed | FailureKind::DuplicatePromotion => StatusCode::CONFLICT,
        FailureKind::ValidationFailed | FailureKind::IncompleteDependents => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        FailureKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        if kind == FailureKind::Internal {
            error!(error = %self.0, "request failed");
        }
        let body = serde_json::json!({
            "error": self.0.to_string(),
            "kind": kind.as_str(),
            "detail": self.0.detail(),
        });
        (status_for(kind), Json(body)).into_response()
    }
}
