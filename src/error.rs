use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("remote call failed: {0}")]
    RemoteCallFailed(String),

    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::Forbidden(_) => "forbidden",
            AppError::PreconditionFailed(_) => "precondition_failed",
            AppError::InvalidTransition(_) => "invalid_transition",
            AppError::RemoteCallFailed(_) => "remote_call_failed",
            AppError::ConcurrencyConflict(_) => "concurrency_conflict",
            AppError::Internal(_) => "internal",
        }
    }

    /// Errors worth retrying against the store or a gateway.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::RemoteCallFailed(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::PreconditionFailed(msg) => (StatusCode::PRECONDITION_FAILED, msg.clone()),
            AppError::InvalidTransition(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::RemoteCallFailed(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::ConcurrencyConflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message,
            "kind": self.kind(),
        }));

        (status, body).into_response()
    }
}
